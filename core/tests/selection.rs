//! Secondary entity selection.

use popsim_core::{
    action::{Action, Binding},
    condition::{CompareOp, Condition},
    config::WorldConfig,
    expression::ParseScope,
    rng::{RngBank, RngSlot, SimRng},
    secondary::{SecondaryEntitySelector, SelectionCount},
    value::Value,
    world::World,
};
use std::collections::HashSet;

fn smokers(population: usize) -> World {
    let json = format!(
        r#"{{
        "seed": 99,
        "entities": [
            {{ "name": "Smoker", "population": {population}, "properties": [
                {{ "name": "age", "type": "integer", "init": 20 }}
            ] }},
            {{ "name": "Doctor", "population": 2, "properties": [] }}
        ],
        "termination": {{ "ticks": 10 }}
    }}"#
    );
    let mut world = WorldConfig::from_json(&json).unwrap().build().unwrap();
    world.start().unwrap();
    world
}

fn scope(world: &World) -> ParseScope<'_> {
    ParseScope::new(world.population(), world.environment(), "Smoker")
}

fn age_filter(world: &World, age: &str) -> Condition {
    Condition::single("age", CompareOp::Eq, age, &scope(world)).unwrap()
}

fn set_age(world: &mut World, id: u64, age: &str) {
    let action = Action::set(&scope(world), "age", age).unwrap();
    world.apply(&action, Binding::main(id)).unwrap();
}

/// `All` returns every live instance of the target type, once each.
#[test]
fn all_returns_the_full_live_population() {
    let world = smokers(10);
    let selector = SecondaryEntitySelector {
        target_type: "Smoker".into(),
        count: SelectionCount::All,
        filters: vec![age_filter(&world, "99")],
    };
    let mut rng = RngBank::new(5).stream(RngSlot::Selection);
    let chosen = selector
        .choose(world.population(), world.environment(), 0, &mut rng)
        .unwrap();

    let unique: HashSet<_> = chosen.iter().copied().collect();
    assert_eq!(chosen.len(), 10, "All ignores filters");
    assert_eq!(unique.len(), 10, "No duplicates");
    assert_eq!(chosen, world.population().ids_of_type("Smoker"));
}

/// Count 3 over a five-entity filtered subset picks three distinct members
/// of that subset.
#[test]
fn count_three_of_five_qualifying() {
    let mut world = smokers(8);
    let ids = world.population().ids_of_type("Smoker");
    for id in &ids[5..] {
        set_age(&mut world, *id, "40");
    }
    let qualifying: HashSet<_> = ids[..5].iter().copied().collect();

    let selector = SecondaryEntitySelector {
        target_type: "Smoker".into(),
        count: SelectionCount::Count(3),
        filters: vec![age_filter(&world, "20")],
    };
    let mut rng = RngBank::new(5).stream(RngSlot::Selection);
    for tick in 0..20 {
        let chosen = selector
            .choose(world.population(), world.environment(), tick, &mut rng)
            .unwrap();
        let unique: HashSet<_> = chosen.iter().copied().collect();
        assert_eq!(chosen.len(), 3);
        assert_eq!(unique.len(), 3, "Sampling is without replacement");
        assert!(unique.is_subset(&qualifying), "Picked a non-qualifying entity: {chosen:?}");
    }
}

/// A count larger than the subset returns the whole subset; an empty
/// subset returns nothing.
#[test]
fn count_is_capped_by_the_subset() {
    let mut world = smokers(6);
    let ids = world.population().ids_of_type("Smoker");
    set_age(&mut world, ids[0], "40");
    set_age(&mut world, ids[1], "40");

    let mut rng = RngBank::new(1).stream(RngSlot::Selection);
    let pick = |age: &str, rng: &mut SimRng| {
        SecondaryEntitySelector {
            target_type: "Smoker".into(),
            count: SelectionCount::Count(5),
            filters: vec![age_filter(&world, age)],
        }
        .choose(world.population(), world.environment(), 0, rng)
        .unwrap()
    };

    let mut forty = pick("40", &mut rng);
    forty.sort_unstable();
    assert_eq!(forty, vec![ids[0], ids[1]]);
    assert!(pick("70", &mut rng).is_empty());
}

/// Filters combine with OR; no filters means everyone qualifies.
#[test]
fn filters_are_alternatives() {
    let mut world = smokers(6);
    let ids = world.population().ids_of_type("Smoker");
    set_age(&mut world, ids[0], "30");
    set_age(&mut world, ids[1], "40");

    let mut rng = RngBank::new(2).stream(RngSlot::Selection);
    let either = SecondaryEntitySelector {
        target_type: "Smoker".into(),
        count: SelectionCount::Count(10),
        filters: vec![age_filter(&world, "30"), age_filter(&world, "40")],
    };
    let mut chosen = either
        .choose(world.population(), world.environment(), 0, &mut rng)
        .unwrap();
    chosen.sort_unstable();
    assert_eq!(chosen, vec![ids[0], ids[1]]);

    let unfiltered = SecondaryEntitySelector {
        target_type: "Smoker".into(),
        count: SelectionCount::Count(10),
        filters: Vec::new(),
    };
    let chosen = unfiltered
        .choose(world.population(), world.environment(), 0, &mut rng)
        .unwrap();
    assert_eq!(chosen.len(), 6);
}

/// A rule acting with a secondary selection runs once per chosen pair.
#[test]
fn secondary_binding_runs_once_per_pair() {
    let mut world = WorldConfig::from_json(
        r#"{
        "seed": 4,
        "entities": [
            { "name": "Doctor", "population": 2, "properties": [
                { "name": "patients", "type": "integer", "init": 0 }
            ] },
            { "name": "Smoker", "population": 5, "properties": [
                { "name": "age", "type": "integer", "init": 20 }
            ] }
        ],
        "rules": [{ "name": "rounds", "actions": [
            { "entity": "Doctor", "secondary": { "entity": "Smoker", "count": 3 },
              "type": "increase", "property": "patients", "by": "Smoker.age" }
        ] }],
        "termination": { "ticks": 10 }
    }"#,
    )
    .unwrap()
    .build()
    .unwrap();
    world.start().unwrap();
    world.tick(0).unwrap();

    let snapshot = world.snapshot("s");
    for doctor in snapshot.entities_of("Doctor") {
        assert_eq!(doctor.properties["patients"].value, Value::Integer(60));
    }
}

/// With a secondary of the main entity's own type, `secondary.` reads the
/// chosen peer, the bare type name reads the main entity, and a nested
/// action on `secondary` lands on the peer.
#[test]
fn same_type_secondary_is_reachable() {
    let mut world = WorldConfig::from_json(
        r#"{
        "seed": 6,
        "entities": [{ "name": "Smoker", "population": 2, "properties": [
            { "name": "age", "type": "integer", "init": 10 },
            { "name": "peer", "type": "integer", "init": 0 },
            { "name": "own", "type": "integer", "init": 0 },
            { "name": "nudged", "type": "integer", "init": 0 }
        ] }],
        "rules": [{ "name": "peers", "actions": [
            { "entity": "Smoker",
              "secondary": { "entity": "Smoker", "count": 1, "filters": [
                  { "kind": "single", "property": "age", "operator": "=", "value": 99 }
              ] },
              "type": "set", "property": "peer", "value": "secondary.age" },
            { "entity": "Smoker",
              "secondary": { "entity": "Smoker", "count": 1, "filters": [
                  { "kind": "single", "property": "age", "operator": "=", "value": 99 }
              ] },
              "type": "set", "property": "own", "value": "Smoker.age" },
            { "entity": "Smoker",
              "secondary": { "entity": "Smoker", "count": 1, "filters": [
                  { "kind": "single", "property": "age", "operator": "=", "value": 99 }
              ] },
              "type": "condition",
              "condition": { "kind": "single", "property": "age", "operator": "=", "value": 10 },
              "then": [ { "entity": "secondary", "type": "increase", "property": "nudged", "by": 1 } ] }
        ] }],
        "termination": { "ticks": 10 }
    }"#,
    )
    .unwrap()
    .build()
    .unwrap();
    world.start().unwrap();
    let ids = world.population().ids_of_type("Smoker");
    set_age(&mut world, ids[1], "99");
    world.tick(0).unwrap();

    let snapshot = world.snapshot("s");
    let read = |id: u64, property: &str| {
        snapshot
            .entities
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.properties[property].value.clone())
            .unwrap()
    };
    assert_eq!(read(ids[0], "peer"), Value::Integer(99), "secondary.age is the peer's age");
    assert_eq!(read(ids[1], "peer"), Value::Integer(99));
    assert_eq!(read(ids[0], "own"), Value::Integer(10), "Smoker.age stays on the main entity");
    assert_eq!(read(ids[1], "own"), Value::Integer(99));
    assert_eq!(read(ids[0], "nudged"), Value::Integer(0));
    assert_eq!(read(ids[1], "nudged"), Value::Integer(1), "The nested action hit the peer");
}

/// `secondary` is only a valid qualifier where a secondary is bound.
#[test]
fn secondary_qualifier_needs_a_secondary() {
    let world = smokers(2);
    assert!(Action::set(&scope(&world), "age", "secondary.age").is_err());
}
