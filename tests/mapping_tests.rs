//! Integration tests for mapping CSV rows to typed targets and back

use chrono::NaiveDate;
use uuid::Uuid;

use flatmapper::{
    ok_rows, ClassMeta, ColumnDefinition, ColumnKey, ConversionError, FieldErrorPolicy, FieldValue,
    Formats, MapperConfig, MapperError, MapperFactory, ValueType,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct Address {
    city: String,
    zip: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Customer {
    id: i64,
    first_name: String,
    joined: Option<NaiveDate>,
    scores: Vec<i32>,
    address: Option<Address>,
}

fn address_meta() -> ClassMeta<Address> {
    ClassMeta::with_default("Address")
        .field("city", |a: &Address| &a.city, |a: &mut Address| &mut a.city)
        .field("zip", |a: &Address| &a.zip, |a: &mut Address| &mut a.zip)
}

fn customer_meta() -> ClassMeta<Customer> {
    ClassMeta::with_default("Customer")
        .field("id", |c: &Customer| &c.id, |c: &mut Customer| &mut c.id)
        .field("first_name", |c: &Customer| &c.first_name, |c: &mut Customer| &mut c.first_name)
        .field("joined", |c: &Customer| &c.joined, |c: &mut Customer| &mut c.joined)
        .container("scores", |c: &Customer| &c.scores, |c: &mut Customer| &mut c.scores)
        .object(
            "address",
            address_meta(),
            |c: &Customer| c.address.as_ref(),
            |c: &mut Customer, a: Address| c.address = Some(a),
        )
}

#[test]
fn test_csv_to_nested_objects_and_containers() {
    let csv = "\
ID,First Name,joined,scores_0,scores_1,address_city,address_zip
1,Ada,2024-03-01,7,9,London,N1
2,Grace,,3,,,
";
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let customers = factory
        .csv_mapper(customer_meta())
        .read_all(csv.as_bytes());

    // an empty score cell is null and cannot become an i32
    let err = customers.unwrap_err();
    assert!(matches!(err, MapperError::Conversion(_)), "got {:?}", err);

    let csv = csv.replace("3,,,", "3,4,,");
    let customers = factory
        .csv_mapper(customer_meta())
        .read_all(csv.as_bytes())
        .unwrap();

    assert_eq!(customers.len(), 2);
    assert_eq!(
        customers[0],
        Customer {
            id: 1,
            first_name: "Ada".to_string(),
            joined: NaiveDate::from_ymd_opt(2024, 3, 1),
            scores: vec![7, 9],
            address: Some(Address {
                city: "London".to_string(),
                zip: Some("N1".to_string()),
            }),
        }
    );
    assert_eq!(customers[1].joined, None);
    assert_eq!(customers[1].scores, vec![3, 4]);
    assert_eq!(customers[1].address, None);
}

#[test]
fn test_failing_row_does_not_end_stream() {
    let csv = "id,first_name\n1,Ada\nx,Bad\n3,Linus\n";
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let results: Vec<_> = factory
        .csv_mapper(customer_meta())
        .iterate(csv.as_bytes())
        .unwrap()
        .collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().id, 1);
    match &results[1] {
        Err(MapperError::Conversion(e)) => {
            assert_eq!(e.value, FieldValue::from("x"));
            assert_eq!(e.column.as_ref().map(|c| c.name.as_str()), Some("id"));
        }
        other => panic!("expected conversion error, got {:?}", other),
    }
    assert_eq!(results[2].as_ref().unwrap().first_name, "Linus");
}

#[test]
fn test_field_error_policies() {
    let columns = ColumnKey::from_names(&["id", "first_name"], 0);
    let row = vec![FieldValue::from("oops"), FieldValue::from("Ada")];

    let skip = MapperFactory::new(MapperConfig::default().with_field_error_policy(FieldErrorPolicy::Skip)).unwrap();
    let meta = customer_meta().default_instantiator(|| Customer {
        id: 42,
        ..Customer::default()
    });
    let skipped = skip.read_mapper(&meta, &columns).unwrap().map(&row).unwrap();
    assert_eq!(skipped.id, 42);
    assert_eq!(skipped.first_name, "Ada");

    let default =
        MapperFactory::new(MapperConfig::default().with_field_error_policy(FieldErrorPolicy::Default)).unwrap();
    let defaulted = default.read_mapper(&meta, &columns).unwrap().map(&row).unwrap();
    assert_eq!(defaulted.id, 0);
    assert_eq!(defaulted.first_name, "Ada");

    let rethrow = MapperFactory::new(MapperConfig::default()).unwrap();
    let result = rethrow.read_mapper(&meta, &columns).unwrap().map(&row);
    assert!(matches!(result, Err(MapperError::Conversion(_))));
}

#[test]
fn test_rename_ignore_and_converters() {
    let config = MapperConfig::default()
        .with_column("town", ColumnDefinition::rename("address.city"))
        .with_column("internal", ColumnDefinition::ignore())
        .with_column("given", ColumnDefinition {
            rename: Some("first_name".to_string()),
            converter: Some("shout".to_string()),
            ..ColumnDefinition::default()
        })
        .with_fail_on_unmapped(true);
    let factory = MapperFactory::new(config)
        .unwrap()
        .with_converter(
            "shout",
            |value: FieldValue, _formats: &Formats| -> Result<FieldValue, ConversionError> {
                match value {
                    FieldValue::String(s) => Ok(FieldValue::String(format!("{}!", s.to_uppercase()))),
                    other => Ok(other),
                }
            },
        );

    let csv = "id,given,internal,town\n5,ada,secret,Paris\n";
    let customers = factory
        .csv_mapper(customer_meta())
        .read_all(csv.as_bytes())
        .unwrap();
    assert_eq!(customers[0].first_name, "ADA!");
    assert_eq!(customers[0].address.as_ref().map(|a| a.city.as_str()), Some("Paris"));

    // an unknown column fails the build when fail_on_unmapped is set
    let result = factory.csv_mapper(customer_meta()).read_all("id,nickname\n1,x\n".as_bytes());
    assert!(matches!(result, Err(MapperError::UnmappedColumn { .. })));
}

#[test]
fn test_unknown_converter_fails_compilation() {
    let config = MapperConfig::default().with_column("id", ColumnDefinition::converter("missing"));
    let factory = MapperFactory::new(config).unwrap();
    let columns = ColumnKey::from_names(&["id"], 0);
    let result = factory.read_mapper(&customer_meta(), &columns);
    assert!(matches!(result, Err(MapperError::ConverterNotFound(_))));
}

#[derive(Debug, PartialEq)]
struct Point {
    x: i64,
    y: i64,
    label: String,
}

#[test]
fn test_constructor_injection() {
    let meta = ClassMeta::new("Point")
        .constructor(&[("x", ValueType::Int), ("y", ValueType::Int)], |args| {
            Ok(Point {
                x: args.take("x")?,
                y: args.take("y")?,
                label: String::new(),
            })
        })
        .read_only("x", |p: &Point| &p.x)
        .read_only("y", |p: &Point| &p.y)
        .field("label", |p: &Point| &p.label, |p: &mut Point| &mut p.label);

    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let columns = ColumnKey::from_names(&["label", "y", "x"], 0);
    let reader = factory.read_mapper(&meta, &columns).unwrap();
    let point = reader
        .map(&vec![FieldValue::from("origin"), FieldValue::Int(2), FieldValue::from("1")])
        .unwrap();
    assert_eq!(
        point,
        Point {
            x: 1,
            y: 2,
            label: "origin".to_string()
        }
    );

    let writer = factory.write_mapper(&meta, &columns).unwrap();
    assert_eq!(
        writer.to_row(&point).unwrap(),
        vec![FieldValue::from("origin"), FieldValue::Int(2), FieldValue::Int(1)]
    );
}

fn policy_factory(policy: FieldErrorPolicy) -> MapperFactory {
    MapperFactory::new(MapperConfig::default().with_field_error_policy(policy)).unwrap()
}

#[test]
fn test_constructor_arguments_follow_field_error_policy() {
    let optional_x = ClassMeta::new("Point").constructor(&[("x", ValueType::Int), ("y", ValueType::Int)], |args| {
        Ok(Point {
            x: args.take::<Option<i64>>("x")?.unwrap_or(-1),
            y: args.take("y")?,
            label: String::new(),
        })
    });
    let columns = ColumnKey::from_names(&["x", "y"], 0);
    let row = vec![FieldValue::from("oops"), FieldValue::from("2")];

    let skipped = policy_factory(FieldErrorPolicy::Skip)
        .read_mapper(&optional_x, &columns)
        .unwrap()
        .map(&row)
        .unwrap();
    assert_eq!((skipped.x, skipped.y), (-1, 2));

    let defaulted = policy_factory(FieldErrorPolicy::Default)
        .read_mapper(&optional_x, &columns)
        .unwrap()
        .map(&row)
        .unwrap();
    assert_eq!((defaulted.x, defaulted.y), (0, 2));

    let rethrown = policy_factory(FieldErrorPolicy::Rethrow)
        .read_mapper(&optional_x, &columns)
        .unwrap()
        .map(&row);
    match rethrown {
        Err(MapperError::Conversion(e)) => {
            assert_eq!(e.column, Some(ColumnKey::new("x", 0)));
            assert_eq!(e.expected, ValueType::Int);
        }
        other => panic!("expected a conversion error, got {:?}", other),
    }
}

#[test]
fn test_skipped_required_argument_reports_its_column() {
    let meta = ClassMeta::new("Point").constructor(&[("x", ValueType::Int)], |args| {
        Ok(Point {
            x: args.take("x")?,
            y: 0,
            label: String::new(),
        })
    });
    let columns = ColumnKey::from_names(&["label", "x"], 0);
    let result = policy_factory(FieldErrorPolicy::Skip)
        .read_mapper(&meta, &columns)
        .unwrap()
        .map(&vec![FieldValue::from("o"), FieldValue::from("oops")]);
    match result {
        Err(MapperError::Conversion(e)) => assert_eq!(e.column, Some(ColumnKey::new("x", 1))),
        other => panic!("expected a conversion error, got {:?}", other),
    }
}

#[derive(Debug, PartialEq)]
struct Event {
    id: Uuid,
    name: String,
    attendees: u32,
}

#[test]
fn test_staged_builder_collects_every_value() {
    let meta = ClassMeta::new("Event")
        .staged_builder(&[], |args| {
            Ok(Event {
                id: args.take("id")?,
                name: args.take("name")?,
                attendees: args.take::<Option<u32>>("attendees")?.unwrap_or(0),
            })
        })
        .read_only("id", |e: &Event| &e.id)
        .read_only("name", |e: &Event| &e.name)
        .read_only("attendees", |e: &Event| &e.attendees);

    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let csv = "name,id\nlaunch,67e55044-10b1-426f-9247-bb680e5fe0c8\n";
    let events = factory.csv_mapper(meta).read_all(csv.as_bytes()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "launch");
    assert_eq!(events[0].attendees, 0);
    assert_eq!(
        events[0].id,
        Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap()
    );
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Tagged {
    id: i64,
    tags: Vec<String>,
}

fn tagged_meta() -> ClassMeta<Tagged> {
    ClassMeta::with_default("Tagged")
        .field("id", |t: &Tagged| &t.id, |t: &mut Tagged| &mut t.id)
        .container("tags", |t: &Tagged| &t.tags, |t: &mut Tagged| &mut t.tags)
}

#[test]
fn test_write_list_elements_at_positions() {
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let columns = vec![
        ColumnKey::new("id", 0),
        ColumnKey::new("tags_0", 5),
        ColumnKey::new("tags_1", 6),
        ColumnKey::new("tags_2", 7),
    ];
    let writer = factory.write_mapper(&tagged_meta(), &columns).unwrap();
    let row = writer
        .to_row(&Tagged {
            id: 9,
            tags: vec!["a".to_string(), "b".to_string()],
        })
        .unwrap();

    assert_eq!(row.len(), 8);
    assert_eq!(row[0], FieldValue::Int(9));
    assert!(row[1..5].iter().all(FieldValue::is_null));
    assert_eq!(row[5], FieldValue::from("a"));
    assert_eq!(row[6], FieldValue::from("b"));
    assert_eq!(row[7], FieldValue::Null);
}

#[test]
fn test_write_list_longer_than_bound_columns() {
    let columns = ColumnKey::from_names(&["id", "tags_0", "tags_1"], 0);
    let long = Tagged {
        id: 1,
        tags: vec!["a".to_string(), "b".to_string(), "c".to_string()],
    };

    let strict = MapperFactory::new(MapperConfig::default()).unwrap();
    match strict.write_mapper(&tagged_meta(), &columns).unwrap().to_row(&long) {
        Err(MapperError::Conversion(e)) => assert_eq!(e.column, Some(ColumnKey::new("tags_1", 2))),
        other => panic!("expected a conversion error, got {:?}", other),
    }

    let lenient = policy_factory(FieldErrorPolicy::Skip);
    let writer = lenient.write_mapper(&tagged_meta(), &columns).unwrap();
    assert_eq!(
        writer.to_row(&long).unwrap(),
        vec![FieldValue::Int(1), FieldValue::from("a"), FieldValue::from("b")]
    );

    // positions past the list size are absent, not errors
    let short = Tagged {
        id: 2,
        tags: vec!["a".to_string()],
    };
    assert_eq!(
        writer.to_row(&short).unwrap(),
        vec![FieldValue::Int(2), FieldValue::from("a"), FieldValue::Null]
    );
}

#[test]
fn test_write_constants_and_absent_objects() {
    let config = MapperConfig::default().with_column("source", ColumnDefinition::constant(FieldValue::from("crm")));
    let factory = MapperFactory::new(config).unwrap();
    let columns = ColumnKey::from_names(&["id", "source", "address_city"], 0);
    let writer = factory.write_mapper(&customer_meta(), &columns).unwrap();

    let row = writer
        .to_row(&Customer {
            id: 3,
            ..Customer::default()
        })
        .unwrap();
    assert_eq!(row, vec![FieldValue::Int(3), FieldValue::from("crm"), FieldValue::Null]);
}

#[test]
fn test_csv_write_then_read() {
    let factory = MapperFactory::new(MapperConfig::default()).unwrap();
    let customers = vec![
        Customer {
            id: 1,
            first_name: "Ada, Countess".to_string(),
            joined: NaiveDate::from_ymd_opt(1815, 12, 10),
            scores: vec![1, 2],
            address: Some(Address {
                city: "London".to_string(),
                zip: None,
            }),
        },
        Customer {
            id: 2,
            first_name: "Grace \"Amazing\"".to_string(),
            joined: None,
            scores: vec![3, 4],
            address: None,
        },
    ];
    let columns = ColumnKey::from_names(
        &["id", "first_name", "joined", "scores_0", "scores_1", "address_city", "address_zip"],
        0,
    );

    let mut buf = Vec::new();
    let written = factory
        .csv_mapper(customer_meta())
        .write_all(&mut buf, &columns, &customers)
        .unwrap();
    assert_eq!(written, 2);

    let read = factory
        .csv_mapper(customer_meta())
        .read_all(buf.as_slice())
        .unwrap();
    assert_eq!(read, customers);
}

#[test]
fn test_headerless_rows_and_generic_sources() {
    let config = MapperConfig::default()
        .with_header(false)
        .with_column_names(["id", "first_name"]);
    let factory = MapperFactory::new(config).unwrap();
    let customers = factory
        .csv_mapper(customer_meta())
        .read_all("1,Ada\n2,Grace\n".as_bytes())
        .unwrap();
    assert_eq!(customers.len(), 2);
    assert_eq!(customers[1].first_name, "Grace");

    let columns = ColumnKey::from_names(&["id", "first_name"], 0);
    let rows = vec![
        vec![FieldValue::Int(7), FieldValue::from("Linus")],
        vec![FieldValue::Int(8), FieldValue::from("Barbara")],
    ];
    let mapped: Vec<Customer> = factory
        .map_rows(&customer_meta(), &columns, ok_rows(rows))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(mapped[0].id, 7);
    assert_eq!(mapped[1].first_name, "Barbara");
}

#[test]
fn test_yaml_configuration() {
    let yaml = r#"
separator: ";"
field_error_policy: skip
columns:
  nom:
    rename: first_name
    converter: trim
"#;
    let config = MapperConfig::from_yaml_str(yaml).unwrap();
    let factory = MapperFactory::new(config).unwrap();
    let customers = factory
        .csv_mapper(customer_meta())
        .read_all("id;nom\nbad; Ada \n".as_bytes())
        .unwrap();
    assert_eq!(customers[0].id, 0);
    assert_eq!(customers[0].first_name, "Ada");
}
