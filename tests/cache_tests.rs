//! Integration tests for sharing compiled mappers across plans and threads

use std::sync::Arc;
use std::thread;

use flatmapper::{ClassMeta, ColumnKey, FieldValue, MapperConfig, MapperFactory};

#[derive(Debug, Default, Clone, PartialEq)]
struct Address {
    city: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Person {
    id: i64,
    name: String,
    address: Option<Address>,
}

fn person_meta() -> ClassMeta<Person> {
    let address = ClassMeta::with_default("Address")
        .field("city", |a: &Address| &a.city, |a: &mut Address| &mut a.city);
    ClassMeta::with_default("Person")
        .field("id", |p: &Person| &p.id, |p: &mut Person| &mut p.id)
        .field("name", |p: &Person| &p.name, |p: &mut Person| &mut p.name)
        .object(
            "address",
            address,
            |p: &Person| p.address.as_ref(),
            |p: &mut Person, a: Address| p.address = Some(a),
        )
}

#[test]
fn test_concurrent_requests_share_one_mapper() {
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let columns = ColumnKey::from_names(&["id", "name"], 0);
    let meta = person_meta();

    let mappers: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let factory = &factory;
                let columns = &columns;
                let meta = &meta;
                scope.spawn(move || factory.read_mapper(meta, columns).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(factory.cache().len(), 1);
    let compilations = factory.cache().compilations();
    assert!((1..=8).contains(&compilations), "{} compilations", compilations);
    for mapper in &mappers[1..] {
        assert!(Arc::ptr_eq(&mappers[0], mapper));
    }

    let person = mappers[3]
        .map(&vec![FieldValue::Int(1), FieldValue::from("Ada")])
        .unwrap();
    assert_eq!(person.name, "Ada");
}

#[test]
fn test_structural_keys_separate_plans() {
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let meta = person_meta();
    let by_id = ColumnKey::from_names(&["id", "name"], 0);
    let reordered = ColumnKey::from_names(&["name", "id"], 0);

    let first = factory.read_mapper(&meta, &by_id).unwrap();
    let again = factory.read_mapper(&meta.clone(), &by_id).unwrap();
    let other = factory.read_mapper(&meta, &reordered).unwrap();
    let writer = factory.write_mapper(&meta, &by_id).unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(factory.cache().len(), 3);

    let row = vec![FieldValue::Int(2), FieldValue::from("Bo")];
    let person = first.map(&row).unwrap();
    assert_eq!(writer.to_row(&person).unwrap(), row);
}

#[test]
fn test_nested_mappers_are_cached() {
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let columns = ColumnKey::from_names(&["id", "address_city"], 0);
    let meta = person_meta();

    let mapper = factory.read_mapper(&meta, &columns).unwrap();
    // the person mapper and its address mapper
    assert_eq!(factory.cache().len(), 2);

    let person = mapper
        .map(&vec![FieldValue::Int(1), FieldValue::from("Oslo")])
        .unwrap();
    assert_eq!(person.address, Some(Address { city: "Oslo".to_string() }));

    factory.read_mapper(&meta, &columns).unwrap();
    assert_eq!(factory.cache().len(), 2);
    assert_eq!(factory.cache().compilations(), 2);
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Pair {
    a: String,
    b: String,
}

#[test]
fn test_registrations_of_one_type_do_not_share_mappers() {
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let columns = ColumnKey::from_names(&["v"], 0);
    let into_a = ClassMeta::with_default("Pair").field("v", |p: &Pair| &p.a, |p: &mut Pair| &mut p.a);
    let into_b = ClassMeta::with_default("Pair").field("v", |p: &Pair| &p.b, |p: &mut Pair| &mut p.b);

    let row = vec![FieldValue::from("x")];
    let first = factory.read_mapper(&into_a, &columns).unwrap().map(&row).unwrap();
    let second = factory.read_mapper(&into_b, &columns).unwrap().map(&row).unwrap();

    assert_eq!(first, Pair { a: "x".to_string(), b: String::new() });
    assert_eq!(second, Pair { a: String::new(), b: "x".to_string() });
    assert_eq!(factory.cache().len(), 2);
}

#[test]
fn test_instantiators_are_part_of_the_key() {
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let columns = ColumnKey::from_names(&["a"], 0);
    let plain = ClassMeta::with_default("Pair").field("a", |p: &Pair| &p.a, |p: &mut Pair| &mut p.a);
    let seeded = ClassMeta::new("Pair")
        .default_instantiator(|| Pair {
            a: String::new(),
            b: "seed".to_string(),
        })
        .field("a", |p: &Pair| &p.a, |p: &mut Pair| &mut p.a);

    let row = vec![FieldValue::from("x")];
    assert_eq!(factory.read_mapper(&plain, &columns).unwrap().map(&row).unwrap().b, "");
    assert_eq!(factory.read_mapper(&seeded, &columns).unwrap().map(&row).unwrap().b, "seed");
}
