//! Simulated players for running the engine without a game server.
//!
//! [`DemoBots`] connects a fixed number of bots, then every tick nudges
//! each one a block in a random direction and occasionally kills one, so
//! the configured modules (lobby, control points, respawns) have players
//! to act on.

use blur_core::{Host, HostEvent, MemoryHost, SessionTree, TickCallback, TickSummary};
use blur_types::{PlayerId, Point};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::DemoConfig;

const SPAWN_HEIGHT: f64 = 64.0;

/// Drives demo bots through the host event API.
pub struct DemoBots {
    bots: Vec<PlayerId>,
    roam: f64,
    death_chance: f64,
    rng: StdRng,
}

impl DemoBots {
    /// Bots are not connected until [`DemoBots::connect_all`].
    pub fn new(config: &DemoConfig, seed: u64) -> Self {
        Self {
            bots: Vec::with_capacity(config.bots),
            roam: f64::from(config.roam.max(1)),
            death_chance: if config.death_chance.is_finite() {
                config.death_chance.clamp(0.0, 1.0)
            } else {
                0.0
            },
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Connect `count` bots to the tree.
    pub fn connect_all(&mut self, tree: &mut SessionTree<MemoryHost>, count: usize) {
        for index in 0..count {
            let bot = PlayerId::new();
            tree.host_mut()
                .set_position(bot, Point::new(0.5, SPAWN_HEIGHT, 0.5));
            tree.handle(HostEvent::Connect {
                player: bot,
                name: format!("bot-{index}"),
            });
            self.bots.push(bot);
        }
        info!(bots = self.bots.len(), "Demo bots connected");
    }

    /// Connected bots.
    pub fn bots(&self) -> &[PlayerId] {
        &self.bots
    }

    fn step(&mut self, tree: &mut SessionTree<MemoryHost>, bot: PlayerId) {
        let Some(from) = tree.host().position(bot.into()) else {
            return;
        };
        if tree.players().is_alive(bot) && self.rng.random_bool(self.death_chance) {
            debug!(player = %bot, "Demo bot died");
            tree.handle(HostEvent::Death { player: bot });
            return;
        }
        let dx = f64::from(self.rng.random_range(-1_i8..=1));
        let dz = f64::from(self.rng.random_range(-1_i8..=1));
        let to = Point::new(
            (from.x + dx).clamp(-self.roam, self.roam),
            from.y,
            (from.z + dz).clamp(-self.roam, self.roam),
        );
        let outcome = tree.handle(HostEvent::Move {
            player: bot,
            from,
            to,
        });
        // A cancelled move leaves the bot where it was.
        if !outcome.cancelled {
            tree.host_mut().set_position(bot, to);
        }
    }
}

impl TickCallback<MemoryHost> for DemoBots {
    fn on_tick(&mut self, _summary: &TickSummary, tree: &mut SessionTree<MemoryHost>) {
        if !tree.is_running() {
            return;
        }
        let bots = self.bots.clone();
        for bot in bots {
            self.step(tree, bot);
        }
    }
}

#[cfg(test)]
mod tests {
    use blur_core::SessionTree;

    use super::*;

    fn config(bots: usize, death_chance: f64) -> DemoConfig {
        DemoConfig {
            bots,
            roam: 4,
            death_chance,
        }
    }

    #[test]
    fn bots_connect_and_stay_in_bounds() {
        let mut tree = SessionTree::new(MemoryHost::new(), 1);
        let root = tree.root();
        assert!(tree.start_session(root).is_ok());
        let mut demo = DemoBots::new(&config(3, 0.0), 7);
        demo.connect_all(&mut tree, 3);
        assert_eq!(tree.players().len(), 3);

        for _ in 0..50 {
            let summary = tree.tick();
            demo.on_tick(&summary, &mut tree);
        }
        for bot in demo.bots() {
            let at = tree.host().position((*bot).into()).unwrap_or_default();
            assert!(at.x.abs() <= 4.0 && at.z.abs() <= 4.0);
            assert!(tree.players().is_alive(*bot));
        }
    }

    #[test]
    fn certain_death_kills_every_bot() {
        let mut tree = SessionTree::new(MemoryHost::new(), 1);
        let root = tree.root();
        assert!(tree.start_session(root).is_ok());
        let mut demo = DemoBots::new(&config(2, 1.0), 7);
        demo.connect_all(&mut tree, 2);
        let summary = tree.tick();
        demo.on_tick(&summary, &mut tree);
        assert!(demo.bots().iter().all(|b| !tree.players().is_alive(*b)));
    }
}
