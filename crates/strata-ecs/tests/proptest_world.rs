//! Property tests for world operations.
//!
//! Random operation sequences run against a small world and a plain
//! `HashMap` model. After every step the world must agree with the model,
//! and every component that was not detached must still live at the address
//! it had before the step.

use std::collections::HashMap;

use proptest::prelude::*;
use strata_ecs::prelude::*;

const CAPACITY: usize = 24;

#[derive(Debug, Clone, PartialEq)]
struct Pos {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct Vel {
    dx: i32,
    dy: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Model {
    pos: Option<Pos>,
    vel: Option<Vel>,
}

#[derive(Debug, Clone)]
enum WorldOp {
    Spawn,
    Destroy(usize),
    AddPos(usize, i32, i32),
    RemovePos(usize),
    AddVel(usize, i32, i32),
    RemoveVel(usize),
    Integrate,
}

fn world_op_strategy() -> impl Strategy<Value = WorldOp> {
    prop_oneof![
        3 => Just(WorldOp::Spawn),
        1 => (0..64usize).prop_map(WorldOp::Destroy),
        2 => (0..64usize, -100..100i32, -100..100i32).prop_map(|(i, x, y)| WorldOp::AddPos(i, x, y)),
        1 => (0..64usize).prop_map(WorldOp::RemovePos),
        2 => (0..64usize, -5..5i32, -5..5i32).prop_map(|(i, dx, dy)| WorldOp::AddVel(i, dx, dy)),
        1 => (0..64usize).prop_map(WorldOp::RemoveVel),
        1 => Just(WorldOp::Integrate),
    ]
}

fn pick(alive: &[EntityId], idx: usize) -> Option<EntityId> {
    (!alive.is_empty()).then(|| alive[idx % alive.len()])
}

fn pos_addresses(world: &World) -> HashMap<EntityId, usize> {
    world
        .iterate::<(Pos,)>()
        .with_owner()
        .map(|(owner, pos)| (owner, pos as *const Pos as usize))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_match_model(ops in prop::collection::vec(world_op_strategy(), 1..80)) {
        let mut world = World::with_config(WorldConfig::with_max_entities(CAPACITY));
        let mut alive: Vec<EntityId> = Vec::new();
        let mut model: HashMap<EntityId, Model> = HashMap::new();
        let mut ever_spawned: Vec<EntityId> = Vec::new();

        for op in ops {
            let before = pos_addresses(&world);
            let mut detached_pos: Option<EntityId> = None;

            match op {
                WorldOp::Spawn => match world.spawn_entity() {
                    Ok(e) => {
                        prop_assert!(alive.len() < CAPACITY);
                        prop_assert!(!ever_spawned.contains(&e), "id {} reused", e);
                        prop_assert!(!world.has_component::<Pos>(e));
                        alive.push(e);
                        ever_spawned.push(e);
                        model.insert(e, Model::default());
                    }
                    Err(err) => {
                        prop_assert_eq!(alive.len(), CAPACITY);
                        let is_capacity_error = matches!(err, EcsError::CapacityExhausted { .. });
                        prop_assert!(is_capacity_error);
                    }
                },
                WorldOp::Destroy(idx) => {
                    if let Some(e) = pick(&alive, idx) {
                        world.destroy_entity(e).unwrap();
                        alive.retain(|x| *x != e);
                        model.remove(&e);
                        detached_pos = Some(e);
                        prop_assert!(world.destroy_entity(e).is_err());
                    }
                }
                WorldOp::AddPos(idx, x, y) => {
                    if let Some(e) = pick(&alive, idx) {
                        let result = world.add_component(e, Pos { x, y });
                        let slot = model.get_mut(&e).unwrap();
                        if slot.pos.is_some() {
                            let is_duplicate = matches!(result, Err(EcsError::DuplicateComponent { .. }));
                            prop_assert!(is_duplicate);
                        } else {
                            prop_assert!(result.is_ok());
                            slot.pos = Some(Pos { x, y });
                        }
                    }
                }
                WorldOp::RemovePos(idx) => {
                    if let Some(e) = pick(&alive, idx) {
                        let result = world.remove_component::<Pos>(e);
                        let expected = model.get_mut(&e).unwrap().pos.take();
                        match expected {
                            Some(pos) => prop_assert_eq!(result.unwrap(), pos),
                            None => prop_assert!(result.is_err()),
                        }
                        detached_pos = Some(e);
                    }
                }
                WorldOp::AddVel(idx, dx, dy) => {
                    if let Some(e) = pick(&alive, idx) {
                        let result = world.add_component(e, Vel { dx, dy });
                        let slot = model.get_mut(&e).unwrap();
                        prop_assert_eq!(result.is_ok(), slot.vel.is_none());
                        if slot.vel.is_none() {
                            slot.vel = Some(Vel { dx, dy });
                        }
                    }
                }
                WorldOp::RemoveVel(idx) => {
                    if let Some(e) = pick(&alive, idx) {
                        let result = world.remove_component::<Vel>(e);
                        let expected = model.get_mut(&e).unwrap().vel.take();
                        prop_assert_eq!(result.ok(), expected);
                    }
                }
                WorldOp::Integrate => {
                    for (pos, vel) in world.iterate_mut::<(Pos, Vel)>() {
                        if let Some(vel) = vel {
                            pos.x += vel.dx;
                            pos.y += vel.dy;
                        }
                    }
                    for entry in model.values_mut() {
                        if let (Some(pos), Some(vel)) = (entry.pos.as_mut(), entry.vel.as_ref()) {
                            pos.x += vel.dx;
                            pos.y += vel.dy;
                        }
                    }
                }
            }

            // Entity bookkeeping.
            prop_assert_eq!(world.entity_count(), alive.len());
            prop_assert!(world.entity_count() <= CAPACITY);
            for &e in &ever_spawned {
                prop_assert_eq!(world.is_alive(e), model.contains_key(&e));
            }

            // Every live entity reads back exactly what the model holds.
            for (&e, expected) in &model {
                prop_assert_eq!(world.get_component::<Pos>(e), expected.pos.as_ref());
                prop_assert_eq!(world.get_component::<Vel>(e), expected.vel.as_ref());
                prop_assert_eq!(world.has_component::<Pos>(e), expected.pos.is_some());
            }

            // Multi-type iteration visits every Pos once, Vel resolved per owner.
            let mut visited = 0;
            for (owner, (pos, vel)) in world.iterate::<(Pos, Vel)>().with_owner() {
                let expected = &model[&owner];
                prop_assert_eq!(Some(pos), expected.pos.as_ref());
                prop_assert_eq!(vel, expected.vel.as_ref());
                visited += 1;
            }
            prop_assert_eq!(visited, model.values().filter(|m| m.pos.is_some()).count());
            prop_assert_eq!(world.component_count::<Pos>(), visited);

            // Components that stayed attached did not move.
            let after = pos_addresses(&world);
            for (owner, address) in &before {
                if Some(*owner) != detached_pos {
                    prop_assert_eq!(after.get(owner), Some(address));
                }
            }
        }
    }

    /// Iteration order is slot order, and reverse iteration is its mirror.
    #[test]
    fn iteration_is_reversible(count in 1..40usize, removals in prop::collection::vec(0..40usize, 0..20)) {
        let mut world = World::with_config(WorldConfig::with_max_entities(64));
        let mut ids = Vec::new();
        for i in 0..count {
            let e = world.spawn_entity().unwrap();
            world.add_component(e, Pos { x: i as i32, y: 0 }).unwrap();
            ids.push(e);
        }
        for idx in removals {
            let e = ids[idx % ids.len()];
            let _ = world.remove_component::<Pos>(e);
        }

        let forward: Vec<i32> = world.iterate::<(Pos,)>().map(|p| p.x).collect();
        let mut backward: Vec<i32> = world.iterate::<(Pos,)>().rev().map(|p| p.x).collect();
        backward.reverse();
        prop_assert_eq!(&forward, &backward);

        // Without frees interleaved with allocations, slot order is insertion order.
        let mut sorted = forward.clone();
        sorted.sort_unstable();
        prop_assert_eq!(forward, sorted);
    }
}
