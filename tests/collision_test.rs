use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use jumpstorm::{
    components::{BoundingBox, Jump, Velocity},
    config::{BroadPhaseKind, Config},
    ecs::EntityId,
    entities::{EntityFactory, EntityKind, EntitySettings, FLOOR_HEIGHT, PLAYER_SIZE},
    host,
    math::{Coord2D, Dimension2D},
    spatial::{BoxedEntry, BroadPhase, Grid, QuadTree},
    Game, SimError,
};

fn run(game: &mut Game, ticks: u64, dt: f64) {
    game.start(0.0);
    for tick in 1..=ticks {
        game.advance(tick as f64 * dt).unwrap();
    }
}

fn assert_resting(config: &Config) {
    let (mut game, player) = host::local_game(config).unwrap();
    run(&mut game, 400, config.server.tick_interval_ms());

    let world = game.world();
    let floor_top = config.world.height - FLOOR_HEIGHT;
    let center = world.get::<BoundingBox>(&player).unwrap().center;
    assert_eq!(center.y, floor_top - PLAYER_SIZE.height / 2.0);
    assert_eq!(world.get::<Velocity>(&player).unwrap().dy, 0.0);
    assert!(world.get::<Jump>(&player).unwrap().can_jump);
}

#[test]
fn test_player_comes_to_rest_on_floor() {
    assert_resting(&Config::default());
}

#[test]
fn test_player_rests_with_quad_tree_broad_phase() {
    let mut config = Config::default();
    config.world.broad_phase = BroadPhaseKind::QuadTree;
    assert_resting(&config);
}

#[test]
fn test_resting_player_stays_put() {
    let config = Config::default();
    let (mut game, player) = host::local_game(&config).unwrap();
    let dt = config.server.tick_interval_ms();
    run(&mut game, 300, dt);
    let rested = game.world().get::<BoundingBox>(&player).unwrap().center;

    for tick in 301..=400 {
        game.advance(tick as f64 * dt).unwrap();
        assert_eq!(game.world().get::<BoundingBox>(&player).unwrap().center, rested);
    }
}

#[test]
fn test_landing_on_rotated_floor_fails_the_tick() {
    let config = Config::default();
    let factory = EntityFactory::new(EntitySettings::from(&config));
    let (mut game, _) = host::local_game(&config).unwrap();

    let tilted = EntityId::new("tilted");
    factory
        .build(
            game.world_mut(),
            EntityKind::Floor,
            &tilted,
            &json!({
                "floorWidth": 200.0,
                "boundingBox": {
                    "center": { "x": 300.0, "y": 200.0 },
                    "dimension": { "width": 200.0, "height": 10.0 },
                    "rotation": 10.0
                }
            }),
        )
        .unwrap();

    game.start(0.0);
    let mut failure = None;
    for tick in 1..=400 {
        if let Err(err) = game.advance(tick as f64 * 8.0) {
            failure = Some(err);
            break;
        }
    }
    match failure {
        Some(SimError::RotatedFloor { entity }) => assert_eq!(entity, tilted),
        other => panic!("expected rotated floor error, got {other:?}"),
    }
}

fn random_box(rng: &mut ChaCha8Rng, rotation: f64) -> BoundingBox {
    BoundingBox::new(
        Coord2D::new(rng.gen_range(0.0..200.0), rng.gen_range(0.0..200.0)),
        Dimension2D::new(rng.gen_range(1.0..60.0), rng.gen_range(1.0..60.0)),
        rotation,
    )
}

#[test]
fn test_separating_axis_agrees_with_axis_aligned_when_unrotated() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut overlaps = 0;
    for _ in 0..2000 {
        let a = random_box(&mut rng, 0.0);
        let b = random_box(&mut rng, 0.0);
        let aabb = a.overlaps_axis_aligned(&b);
        assert_eq!(aabb, a.overlaps_separating_axis(&b), "{a:?} vs {b:?}");
        overlaps += usize::from(aabb);
    }
    assert!(overlaps > 0);
}

#[test]
fn test_rotated_collision_implies_outscribed_overlap() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..2000 {
        let (ra, rb) = (rng.gen_range(0.0..360.0), rng.gen_range(0.0..360.0));
        let a = random_box(&mut rng, ra);
        let b = random_box(&mut rng, rb);
        if a.is_colliding_with(&b) {
            assert!(a.overlaps_axis_aligned(&b), "{a:?} vs {b:?}");
        }
    }
}

fn assert_no_false_negatives(mut broad_phase: Box<dyn BroadPhase>, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let entries: Vec<BoxedEntry> = (0..80)
        .map(|i| {
            BoxedEntry::new(
                EntityId::new(format!("e{i}")),
                Coord2D::new(rng.gen_range(0.0..300.0), rng.gen_range(0.0..300.0)),
                Dimension2D::new(rng.gen_range(1.0..50.0), rng.gen_range(1.0..50.0)),
            )
        })
        .collect();

    broad_phase.clear();
    broad_phase.set_top_left(Coord2D::new(0.0, 0.0));
    broad_phase.set_dimension(Dimension2D::new(300.0, 300.0));
    for entry in &entries {
        broad_phase.insert(entry);
    }

    for a in &entries {
        let neighbors = broad_phase.neighbor_ids(a);
        assert!(!neighbors.contains(&a.id));
        for b in &entries {
            let overlapping = a.id != b.id
                && a.min_x() <= b.max_x()
                && b.min_x() <= a.max_x()
                && a.min_y() <= b.max_y()
                && b.min_y() <= a.max_y();
            if overlapping {
                assert!(neighbors.contains(&b.id), "{} should see {}", a.id, b.id);
            }
        }
    }
}

#[test]
fn test_grid_reports_every_overlapping_pair() {
    let grid = Grid::new(
        Dimension2D::new(300.0, 300.0),
        Dimension2D::new(30.0, 30.0),
        Coord2D::default(),
    );
    assert_no_false_negatives(Box::new(grid), 3);
}

#[test]
fn test_quad_tree_reports_every_overlapping_pair() {
    let tree = QuadTree::new(Coord2D::default(), Dimension2D::new(300.0, 300.0), 6, 4);
    assert_no_false_negatives(Box::new(tree), 5);
}
