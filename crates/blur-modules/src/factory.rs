//! Turns [`ModuleData`] into module instances.
//!
//! Every constructor validates its data, so a module that comes out of the
//! factory is ready to register. The first invalid entry aborts the whole
//! list.

use blur_core::{Module, ModuleError};
use tracing::debug;

use crate::checkpoints::CheckpointsModule;
use crate::controlpoints::ControlPointsModule;
use crate::cooldowns::CooldownsModule;
use crate::data::ModuleData;
use crate::goal::{GoalModule, LastPlayerAliveModule, LastTeamAliveModule};
use crate::lobby::LobbyModule;
use crate::potions::PotionEffectsModule;
use crate::respawns::StaggeredRespawnsModule;
use crate::spawns::SpawnsModule;
use crate::stages::StagesModule;
use crate::teams::TeamsModule;

/// Build one module.
pub fn build_module(data: &ModuleData) -> Result<Box<dyn Module>, ModuleError> {
    let module: Box<dyn Module> = match data {
        ModuleData::Teams(d) => Box::new(TeamsModule::from_data(d.clone())?),
        ModuleData::Spawns(d) => Box::new(SpawnsModule::from_data(d.clone())?),
        ModuleData::ControlPoints(d) => Box::new(ControlPointsModule::from_data(d)?),
        ModuleData::StaggeredRespawns(d) => Box::new(StaggeredRespawnsModule::from_data(d.clone())?),
        ModuleData::Checkpoints(d) => Box::new(CheckpointsModule::from_data(d.clone())?),
        ModuleData::Cooldowns(d) => Box::new(CooldownsModule::new(d.clone())),
        ModuleData::PotionEffects(d) => Box::new(PotionEffectsModule::new(d.clone())),
        ModuleData::Lobby(d) => Box::new(LobbyModule::from_data(d.clone())?),
        ModuleData::Stages(d) => Box::new(StagesModule::from_data(d.clone())?),
        ModuleData::Goal(d) => Box::new(GoalModule::from_data(d.clone())?),
        ModuleData::LastTeamAlive => Box::new(LastTeamAliveModule::new()),
        ModuleData::LastPlayerAlive => Box::new(LastPlayerAliveModule::new()),
    };
    debug!(module = data.type_name(), "Module built");
    Ok(module)
}

/// Build a list of modules in order.
pub fn build_modules(data: &[ModuleData]) -> Result<Vec<Box<dyn Module>>, ModuleError> {
    data.iter().map(build_module).collect()
}

#[cfg(test)]
mod tests {
    use blur_world::Team;

    use super::*;
    use crate::checkpoints::CheckpointsData;
    use crate::cooldowns::CooldownsData;
    use crate::teams::TeamsData;

    #[test]
    fn builds_in_order() {
        let data = vec![
            ModuleData::Teams(TeamsData {
                teams: vec![Team::new("red")],
            }),
            ModuleData::Cooldowns(CooldownsData::default()),
        ];
        let names: Vec<&str> = build_modules(&data)
            .map(|mods| mods.iter().map(|m| m.name()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["teams", "cooldowns"]);
    }

    #[test]
    fn invalid_entry_aborts_the_list() {
        let data = vec![
            ModuleData::Cooldowns(CooldownsData::default()),
            ModuleData::Checkpoints(CheckpointsData::default()),
        ];
        let err = build_modules(&data).err();
        assert!(matches!(err, Some(ModuleError::Parse { module: "checkpoints", .. })));
    }
}
