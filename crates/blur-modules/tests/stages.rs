//! Stages and goals deciding how a session ends.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use blur_core::{HostEvent, MemoryHost, SessionEvent, SessionTree};
use blur_modules::{
    ControlPointEntry, ControlPointsData, ControlPointsModule, GoalData, GoalModule,
    LastPlayerAliveModule, LastTeamAliveModule, ModuleData, PointOverrides, StageConfig,
    StagesData, StagesModule, TeamsData, TeamsModule,
};
use blur_types::{
    BlockPos, LifecycleState, PlayerId, Point, StopReason, TeamId, TickDuration, Winner,
};
use blur_world::{Extent, Team};

fn teams(ids: &[&str]) -> Box<TeamsModule> {
    let data = TeamsData {
        teams: ids.iter().map(|id| Team::new(*id)).collect(),
    };
    Box::new(TeamsModule::from_data(data).unwrap())
}

fn connect(tree: &mut SessionTree<MemoryHost>, name: &str) -> PlayerId {
    let player = PlayerId::new();
    tree.handle(HostEvent::Connect {
        player,
        name: name.to_owned(),
    });
    player
}

fn tick_until(tree: &mut SessionTree<MemoryHost>, tick: u64) {
    while tree.current_tick() < tick {
        tree.tick();
    }
}

fn timed(ticks: u64) -> ModuleData {
    ModuleData::Goal(GoalData {
        time_limit: TickDuration::from_ticks(ticks),
        ..GoalData::default()
    })
}

fn stage(name: &str, modules: Vec<ModuleData>) -> StageConfig {
    StageConfig {
        name: name.to_owned(),
        modules,
    }
}

fn staged_tree(stages: Vec<StageConfig>) -> SessionTree<MemoryHost> {
    let mut tree = SessionTree::new(MemoryHost::new(), 11);
    let root = tree.root();
    let module = StagesModule::from_data(StagesData { stages }).unwrap();
    tree.register_module(root, Box::new(module)).unwrap();
    tree.record_events();
    tree.start_session(root).unwrap();
    tree
}

fn stages(tree: &SessionTree<MemoryHost>) -> &StagesModule {
    tree.module::<StagesModule>(tree.root()).unwrap()
}

fn module_names(tree: &SessionTree<MemoryHost>) -> Vec<&'static str> {
    tree.session(tree.root())
        .unwrap()
        .modules()
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

fn winners(events: &[SessionEvent]) -> Vec<Winner> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::GoalWinners { winners, .. } => Some(winners.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn stop_reason(events: &[SessionEvent]) -> Option<StopReason> {
    events.iter().find_map(|e| match e {
        SessionEvent::SessionStopping { reason, .. } => Some(*reason),
        _ => None,
    })
}

#[test]
fn time_limits_advance_through_every_stage() {
    let mut tree = staged_tree(vec![
        stage("warmup", vec![timed(10)]),
        stage("fight", vec![timed(20), ModuleData::LastPlayerAlive]),
    ]);
    assert_eq!(stages(&tree).current_stage(), Some("warmup"));
    assert_eq!(module_names(&tree), vec!["stages", "goal"]);

    tick_until(&mut tree, 15);
    assert_eq!(stages(&tree).current_index(), Some(1));
    assert_eq!(stages(&tree).current_stage(), Some("fight"));
    assert_eq!(
        module_names(&tree),
        vec!["stages", "goal", "last_player_alive"]
    );

    tick_until(&mut tree, 40);
    assert!(!tree.is_running());

    let events = tree.drain_recorded();
    let changes: Vec<(usize, String, Option<String>, Option<StopReason>)> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StageChanged {
                index,
                stage,
                previous,
                reason,
                ..
            } => Some((*index, stage.clone(), previous.clone(), *reason)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (0, "warmup".to_owned(), None, None),
            (
                1,
                "fight".to_owned(),
                Some("warmup".to_owned()),
                Some(StopReason::TimeLimit)
            ),
        ]
    );
    let complete = events.iter().any(|e| {
        matches!(
            e,
            SessionEvent::StagesComplete { stage, reason: StopReason::TimeLimit, .. }
                if stage == "fight"
        )
    });
    assert!(complete);
    assert_eq!(stop_reason(&events), Some(StopReason::TimeLimit));
}

#[test]
fn simultaneous_stage_ends_advance_once() {
    let mut tree = staged_tree(vec![
        stage("warmup", vec![timed(10), timed(10)]),
        stage("fight", vec![timed(50)]),
        stage("overtime", Vec::new()),
    ]);
    tick_until(&mut tree, 15);
    assert_eq!(stages(&tree).current_stage(), Some("fight"));
    assert!(!stages(&tree).is_complete());
    assert_eq!(module_names(&tree), vec!["stages", "goal"]);
}

#[test]
fn last_team_standing_wins() {
    let mut tree = SessionTree::new(MemoryHost::new(), 12);
    let root = tree.root();
    tree.register_module(root, teams(&["red", "blue"])).unwrap();
    tree.register_module(root, Box::new(LastTeamAliveModule::new()))
        .unwrap();
    tree.start_session(root).unwrap();

    let a = connect(&mut tree, "a");
    let b = connect(&mut tree, "b");
    let survivor = tree.session(root).unwrap().teams().team_of(b).cloned().unwrap();
    assert_ne!(tree.session(root).unwrap().teams().team_of(a), Some(&survivor));

    tree.record_events();
    tree.handle(HostEvent::Death { player: a });
    let events = tree.drain_recorded();
    assert_eq!(winners(&events), vec![Winner::Team(survivor)]);
    assert_eq!(stop_reason(&events), Some(StopReason::ObjectiveSuccess));
    assert!(!tree.is_running());
}

#[test]
fn last_team_alive_needs_two_teams() {
    let mut tree = SessionTree::new(MemoryHost::new(), 13);
    let root = tree.root();
    tree.register_module(root, teams(&["red"])).unwrap();
    let key = tree
        .register_module(root, Box::new(LastTeamAliveModule::new()))
        .unwrap();
    tree.start_session(root).unwrap();
    assert_eq!(tree.module_state(key), Some(LifecycleState::Loaded));
}

#[test]
fn last_player_standing_wins() {
    let mut tree = SessionTree::new(MemoryHost::new(), 14);
    let root = tree.root();
    tree.register_module(root, Box::new(LastPlayerAliveModule::new()))
        .unwrap();
    tree.start_session(root).unwrap();
    let a = connect(&mut tree, "a");
    let b = connect(&mut tree, "b");
    let c = connect(&mut tree, "c");

    tree.record_events();
    tree.handle(HostEvent::Death { player: a });
    assert!(tree.is_running());
    assert!(
        tree.module::<LastPlayerAliveModule>(root)
            .unwrap()
            .winner()
            .is_none()
    );
    tree.handle(HostEvent::Death { player: c });
    let events = tree.drain_recorded();
    assert_eq!(winners(&events), vec![Winner::Player(b)]);
    assert!(!tree.is_running());
    assert!(tree.host().messages(a).iter().any(|m| m == "b won!"));
}

#[test]
fn held_point_scores_until_the_limit() {
    let mut tree = SessionTree::new(MemoryHost::new(), 15);
    let root = tree.root();
    tree.register_module(root, teams(&["red", "blue"])).unwrap();
    let points = ControlPointsData {
        defaults: PointOverrides {
            capture_time: Some(TickDuration::from_ticks(10)),
            points: Some(1.0),
            ..PointOverrides::default()
        },
        control_points: vec![ControlPointEntry {
            id: "mid".to_owned(),
            name: None,
            capture: Some(Extent::cuboid(BlockPos::new(0, 64, 0), BlockPos::new(4, 66, 4))),
            overrides: PointOverrides::default(),
        }],
    };
    tree.register_module(root, Box::new(ControlPointsModule::from_data(&points).unwrap()))
        .unwrap();
    let goal = GoalData {
        score_limit: Some(5.0),
        ..GoalData::default()
    };
    tree.register_module(root, Box::new(GoalModule::from_data(goal).unwrap()))
        .unwrap();
    tree.start_session(root).unwrap();

    let player = connect(&mut tree, "alice");
    let red = TeamId::new("red");
    assert_eq!(tree.session(root).unwrap().teams().team_of(player), Some(&red));

    tree.record_events();
    let inside = BlockPos::new(2, 64, 2).center();
    tree.host_mut().set_position(player, inside);
    tree.handle(HostEvent::Move {
        player,
        from: Point::default(),
        to: inside,
    });
    tick_until(&mut tree, 5);
    assert!(tree.is_running());
    assert!(tree.module::<GoalModule>(root).unwrap().scores().is_empty());

    tick_until(&mut tree, 40);
    assert!(!tree.is_running());
    let events = tree.drain_recorded();
    assert_eq!(winners(&events), vec![Winner::Team(red)]);
    assert_eq!(stop_reason(&events), Some(StopReason::ObjectiveSuccess));
}

#[test]
fn players_out_of_lives_fall_back_to_the_parent() {
    let mut tree = SessionTree::new(MemoryHost::new(), 16);
    let root = tree.root();
    tree.start_session(root).unwrap();
    let game = tree.create_session(root, "match").unwrap();
    let goal = GoalData {
        lives: 2,
        ..GoalData::default()
    };
    tree.register_module(game, Box::new(GoalModule::from_data(goal).unwrap()))
        .unwrap();
    tree.start_session(game).unwrap();

    let player = connect(&mut tree, "p");
    tree.add_player(game, player).unwrap();
    assert_eq!(tree.players().leaf(player), Some(game));

    tree.handle(HostEvent::Death { player });
    assert_eq!(tree.module::<GoalModule>(game).unwrap().deaths(player), 1);
    assert!(tree.respawn(player));
    assert_eq!(tree.players().leaf(player), Some(game));

    tree.handle(HostEvent::Death { player });
    assert_eq!(tree.players().leaf(player), Some(root));
    assert!(tree.module::<GoalModule>(game).unwrap().is_knocked_out(player));
    assert!(
        tree.host()
            .messages(player)
            .iter()
            .any(|m| m == "You are out of lives.")
    );
    assert!(tree.is_running());
}
