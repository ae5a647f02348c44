//! Action semantics driven through whole ticks: conditions, replacement,
//! proximity and the expression helpers.

use popsim_core::{
    action::{Action, Binding},
    config::WorldConfig,
    expression::ParseScope,
    snapshot::WorldSnapshot,
    value::Value,
    world::World,
};

fn build(json: &str) -> World {
    WorldConfig::from_json(json)
        .expect("descriptor parses")
        .build()
        .expect("descriptor builds")
}

fn started(json: &str) -> World {
    let mut world = build(json);
    world.start().expect("world starts");
    world
}

fn value(snapshot: &WorldSnapshot, id: u64, property: &str) -> Value {
    snapshot
        .entities
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.properties[property].value.clone())
        .unwrap_or_else(|| panic!("entity {id} missing from snapshot"))
}

/// Then runs where the condition holds, else everywhere else.
#[test]
fn condition_branches_per_entity() {
    let mut world = started(
        r#"{
        "seed": 8,
        "entities": [{ "name": "Smoker", "population": 6, "properties": [
            { "name": "age", "type": "integer", "init": 20 }
        ] }],
        "rules": [{ "name": "old age", "actions": [
            { "entity": "Smoker", "type": "condition",
              "condition": { "kind": "single", "property": "age", "operator": "bt", "value": 25 },
              "then": [ { "entity": "Smoker", "type": "kill" } ],
              "else": [ { "entity": "Smoker", "type": "increase", "property": "age", "by": 1 } ] }
        ] }],
        "termination": { "ticks": 10 }
    }"#,
    );
    let ids = world.population().ids_of_type("Smoker");
    let make_old = Action::set(
        &ParseScope::new(world.population(), world.environment(), "Smoker"),
        "age",
        "30",
    )
    .unwrap();
    world.apply(&make_old, Binding::main(ids[0])).unwrap();
    world.apply(&make_old, Binding::main(ids[1])).unwrap();

    let report = world.tick(0).unwrap();
    assert_eq!(report.commits.killed.len(), 2);

    let snapshot = world.snapshot("s");
    assert_eq!(snapshot.populations["Smoker"], 4);
    for id in &ids[2..] {
        assert_eq!(value(&snapshot, *id, "age"), Value::Integer(21));
    }
}

/// Multi conditions short-circuit with and/or over their children.
#[test]
fn multi_condition_logic() {
    let mut world = started(
        r#"{
        "entities": [{ "name": "Smoker", "population": 3, "properties": [
            { "name": "age", "type": "integer", "init": 40 },
            { "name": "quit", "type": "boolean", "init": false },
            { "name": "both", "type": "boolean", "init": false },
            { "name": "either", "type": "boolean", "init": false }
        ] }],
        "rules": [{ "name": "flags", "actions": [
            { "entity": "Smoker", "type": "condition",
              "condition": { "kind": "multiple", "logic": "and", "conditions": [
                  { "kind": "single", "property": "age", "operator": "bt", "value": 30 },
                  { "kind": "single", "property": "quit", "operator": "=", "value": true }
              ] },
              "then": [ { "entity": "Smoker", "type": "set", "property": "both", "value": true } ] },
            { "entity": "Smoker", "type": "condition",
              "condition": { "kind": "multiple", "logic": "or", "conditions": [
                  { "kind": "single", "property": "age", "operator": "lt", "value": 30 },
                  { "kind": "single", "property": "quit", "operator": "!=", "value": true }
              ] },
              "then": [ { "entity": "Smoker", "type": "set", "property": "either", "value": true } ] }
        ] }],
        "termination": { "ticks": 10 }
    }"#,
    );
    world.tick(0).unwrap();
    let snapshot = world.snapshot("s");
    for e in snapshot.entities_of("Smoker") {
        assert_eq!(e.properties["both"].value, Value::Boolean(false));
        assert_eq!(e.properties["either"].value, Value::Boolean(true));
    }
}

const METAMORPHOSIS: &str = r#"{
    "seed": 12,
    "entities": [
        { "name": "Caterpillar", "population": 4, "properties": [
            { "name": "age", "type": "integer", "init": 3 },
            { "name": "size", "type": "float", "init": 1.5 }
        ] },
        { "name": "Butterfly", "population": 0, "properties": [
            { "name": "age", "type": "integer", "init": 0 },
            { "name": "size", "type": "integer", "init": 7 },
            { "name": "wings", "type": "integer", "init": 2 }
        ] }
    ],
    "rules": [{ "name": "hatch", "actions": [
        { "entity": "Caterpillar", "type": "replace", "create": "Butterfly", "mode": "MODE" }
    ] }],
    "termination": { "ticks": 10 }
}"#;

/// Scratch replacement builds the new entity from its own definition.
#[test]
fn replace_from_scratch() {
    let mut world = started(&METAMORPHOSIS.replace("MODE", "scratch"));
    let before = world.population().ids_of_type("Caterpillar");
    let report = world.tick(0).unwrap();
    assert_eq!(report.commits.killed.len(), 4);
    assert_eq!(report.commits.born.len(), 4);

    let snapshot = world.snapshot("s");
    assert_eq!(snapshot.populations["Caterpillar"], 0);
    assert_eq!(snapshot.populations["Butterfly"], 4);
    for b in snapshot.entities_of("Butterfly") {
        assert!(!before.contains(&b.id), "Replacement needs a fresh id");
        assert_eq!(b.properties["age"].value, Value::Integer(0));
        assert_eq!(b.properties["wings"].value, Value::Integer(2));
    }
}

/// Derived replacement carries over properties with the same name and
/// type, and generates the rest.
#[test]
fn replace_derived_inherits_matching_properties() {
    let mut world = started(&METAMORPHOSIS.replace("MODE", "derived"));
    world.tick(0).unwrap();

    let snapshot = world.snapshot("s");
    assert_eq!(snapshot.populations["Butterfly"], 4);
    for b in snapshot.entities_of("Butterfly") {
        assert_eq!(b.properties["age"].value, Value::Integer(3), "age is inherited");
        assert_eq!(
            b.properties["size"].value,
            Value::Integer(7),
            "size differs in type and is generated"
        );
        assert_eq!(b.properties["wings"].value, Value::Integer(2));
    }
}

/// On a full grid nobody moves, so every entity has exactly eight
/// neighbours at depth one.
#[test]
fn proximity_visits_each_neighbour() {
    let mut world = started(
        r#"{
        "seed": 21,
        "grid": { "rows": 10, "cols": 10 },
        "entities": [
            { "name": "Doctor", "population": 1, "properties": [
                { "name": "patients", "type": "integer", "init": 0 }
            ] },
            { "name": "Smoker", "population": 99, "properties": [
                { "name": "treated", "type": "boolean", "init": false }
            ] }
        ],
        "rules": [{ "name": "rounds", "actions": [
            { "entity": "Doctor", "type": "proximity", "target": "Smoker", "depth": 1, "then": [
                { "entity": "Doctor", "type": "increase", "property": "patients", "by": 1 },
                { "entity": "Smoker", "type": "set", "property": "treated", "value": true }
            ] }
        ] }],
        "termination": { "ticks": 10 }
    }"#,
    );
    let before = world.snapshot("s");
    let report = world.tick(0).unwrap();
    assert_eq!(report.moved, 0, "A full grid has no free cell to move into");

    let snapshot = world.snapshot("s");
    assert!(
        before
            .entities
            .iter()
            .zip(&snapshot.entities)
            .all(|(a, b)| a.id == b.id && a.coord == b.coord),
        "Nobody should have moved"
    );
    let doctor = snapshot.entities_of("Doctor").next().unwrap();
    assert_eq!(doctor.properties["patients"].value, Value::Integer(8));
    let treated = snapshot
        .entities_of("Smoker")
        .filter(|e| e.properties["treated"].value == Value::Boolean(true))
        .count();
    assert_eq!(treated, 8);
}

/// Proximity between entities of one type binds the neighbour, not the
/// source, as the secondary.
#[test]
fn proximity_within_one_type_reaches_the_neighbour() {
    let mut world = started(
        r#"{
        "seed": 3,
        "grid": { "rows": 10, "cols": 10 },
        "entities": [{ "name": "Smoker", "population": 100, "properties": [
            { "name": "marked", "type": "boolean", "init": false },
            { "name": "touched", "type": "boolean", "init": false }
        ] }],
        "rules": [{ "name": "spread", "actions": [
            { "entity": "Smoker", "type": "proximity", "target": "Smoker", "depth": 1, "then": [
                { "entity": "Smoker", "type": "condition",
                  "condition": { "kind": "single", "property": "marked", "operator": "=", "value": true },
                  "then": [ { "entity": "secondary", "type": "set", "property": "touched", "value": true } ] }
            ] }
        ] }],
        "termination": { "ticks": 10 }
    }"#,
    );
    let source = world.population().ids_of_type("Smoker")[0];
    let mark = Action::set(
        &ParseScope::new(world.population(), world.environment(), "Smoker"),
        "marked",
        "true",
    )
    .unwrap();
    world.apply(&mark, Binding::main(source)).unwrap();
    world.tick(0).unwrap();

    let snapshot = world.snapshot("s");
    let touched: Vec<u64> = snapshot
        .entities_of("Smoker")
        .filter(|e| e.properties["touched"].value == Value::Boolean(true))
        .map(|e| e.id)
        .collect();
    assert_eq!(touched.len(), 8, "Every neighbour of the marked smoker");
    assert!(!touched.contains(&source), "The source is not its own neighbour");
    assert_eq!(value(&snapshot, source, "marked"), Value::Boolean(true));
}

/// environment, evaluate, percent and ticks inside ordinary rules.
#[test]
fn expression_helpers() {
    let mut world = build(
        r#"{
        "entities": [{ "name": "Smoker", "population": 2, "properties": [
            { "name": "age", "type": "integer", "init": 20 },
            { "name": "base", "type": "integer", "init": 0 },
            { "name": "share", "type": "float", "init": 0 },
            { "name": "since", "type": "integer", "init": -1 },
            { "name": "bonus", "type": "integer", "range": { "from": 0, "to": 3 }, "init": 0 }
        ] }],
        "environment": [ { "name": "tax", "type": "float", "range": { "from": 0, "to": 100 } } ],
        "rules": [
            { "name": "grow", "actions": [
                { "entity": "Smoker", "type": "increase", "property": "age", "by": 1 }
            ] },
            { "name": "copy", "actions": [
                { "entity": "Smoker", "type": "set", "property": "base", "value": "evaluate(Smoker.age)" }
            ] },
            { "name": "tax", "actions": [
                { "entity": "Smoker", "type": "set", "property": "share",
                  "value": "percent(age, environment(tax))" }
            ] },
            { "name": "since", "actions": [
                { "entity": "Smoker", "type": "set", "property": "since", "value": "ticks(Smoker.base)" }
            ] },
            { "name": "lottery", "actions": [
                { "entity": "Smoker", "type": "set", "property": "bonus", "value": "random(3)" }
            ] }
        ],
        "termination": { "ticks": 10 }
    }"#,
    );
    world.set_environment("tax", Value::Float(12.5)).unwrap();
    world.start().unwrap();
    for _ in 0..4 {
        world.tick(0).unwrap();
    }

    let snapshot = world.snapshot("s");
    assert_eq!(snapshot.environment["tax"], Value::Float(12.5));
    for e in snapshot.entities_of("Smoker") {
        assert_eq!(e.properties["age"].value, Value::Integer(24));
        assert_eq!(e.properties["base"].value, Value::Integer(20), "declared value");
        assert_eq!(e.properties["share"].value, Value::Float(3.0));
        assert_eq!(e.properties["since"].value, Value::Integer(3));
        let bonus = e.properties["bonus"].value.as_f64().unwrap();
        assert!((0.0..=3.0).contains(&bonus));
    }
}

/// Environment overrides are type-checked and only allowed before start.
#[test]
fn environment_overrides() {
    let json = r#"{
        "entities": [{ "name": "Smoker", "population": 1, "properties": [] }],
        "environment": [ { "name": "tax", "type": "float", "range": { "from": 0, "to": 50 } } ],
        "termination": { "ticks": 1 }
    }"#;
    let mut world = build(json);
    assert!(world.set_environment("tax", Value::Boolean(true)).is_err());
    assert!(world.set_environment("tax", Value::Float(80.0)).is_err(), "Out of range");
    assert!(world.set_environment("rent", Value::Float(1.0)).is_err());
    world.set_environment("tax", Value::Integer(10)).unwrap();
    world.start().unwrap();
    assert_eq!(world.environment().get("tax").unwrap().value(), &Value::Float(10.0));
    assert!(world.set_environment("tax", Value::Float(5.0)).is_err());
}
