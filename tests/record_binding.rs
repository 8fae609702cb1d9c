use csv_bind::{Bindings, CsvConfig, CsvError, CsvReader, CsvRecord, MappingCache};
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Default, PartialEq)]
struct Person {
    name: String,
    age: u32,
    nickname: String,
}

impl CsvRecord for Person {
    fn bindings() -> Bindings<Self> {
        // nickname is deliberately unbound
        Bindings::new()
            .bind("name", "name", |p: &mut Person, v| p.name = v)
            .bind("age", "age", |p: &mut Person, v| p.age = v)
    }
}

#[derive(Debug, Default, PartialEq)]
struct Policy {
    id: i64,
    county: String,
    limit: f64,
    granularity: Option<u8>,
    insured: bool,
}

impl CsvRecord for Policy {
    fn bindings() -> Bindings<Self> {
        Bindings::new()
            .bind("id", "policyID", |p: &mut Policy, v| p.id = v)
            .bind("county", "county", |p: &mut Policy, v| p.county = v)
            .bind("limit", "eq_site_limit", |p: &mut Policy, v| p.limit = v)
            .bind_index("granularity", 3, |p: &mut Policy, v| p.granularity = v)
            .bind("insured", "insured", |p: &mut Policy, v| p.insured = v)
    }
}

fn reader(text: &str) -> CsvReader<Cursor<Vec<u8>>> {
    CsvReader::new(Cursor::new(text.as_bytes().to_vec()), CsvConfig::default())
        .expect("valid config")
}

#[test]
fn binds_integer_column_by_name() -> anyhow::Result<()> {
    let mut r = reader("name,age\nAlice,30\n");
    let person: Person = r.read_row_as()?;
    assert_eq!(
        person,
        Person {
            name: "Alice".into(),
            age: 30,
            nickname: String::new(),
        }
    );
    Ok(())
}

#[test]
fn unparsable_value_is_conversion_error() -> anyhow::Result<()> {
    let mut r = reader("name,age\nAlice,thirty\n");
    match r.read_row_as::<Person>() {
        Err(CsvError::FieldConversion { field, value, .. }) => {
            assert_eq!(field, "age");
            assert_eq!(value, "thirty");
        }
        other => panic!("expected conversion error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn mixed_bindings_and_scalar_types() -> anyhow::Result<()> {
    let text = "policyID,county,eq_site_limit,point_granularity,insured\n\
                119736,CLAY COUNTY,792148.9,1,True\n\
                448094,SUWANNEE,1322376.3,,false\n";
    let mut r = reader(text);
    let policies: Vec<Policy> = r.read_rows_as().collect::<Result<_, _>>()?;
    assert_eq!(policies.len(), 2);
    assert_eq!(
        policies[0],
        Policy {
            id: 119736,
            county: "CLAY COUNTY".into(),
            limit: 792148.9,
            granularity: Some(1),
            insured: true,
        }
    );
    assert_eq!(policies[1].granularity, None);
    assert!(!policies[1].insured);
    Ok(())
}

#[test]
fn missing_column_fails_first_typed_read() -> anyhow::Result<()> {
    let mut r = reader("name,years\nAlice,30\nBob,41\n");
    assert!(matches!(
        r.read_row_as::<Person>(),
        Err(CsvError::ColumnNotSpecified { field: "age", .. })
    ));
    // the failure is not a row error, so the sequence stops at once
    let results: Vec<_> = r.read_rows_as::<Person>().collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
    Ok(())
}

#[test]
fn conversion_errors_do_not_end_sequence() -> anyhow::Result<()> {
    let mut r = reader("name,age\nA,1\nB,x\nC,3\n");
    let results: Vec<_> = r.read_rows_as::<Person>().collect();
    assert_eq!(results.len(), 3);
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().map(|p| p.age).ok(), Some(3));
    Ok(())
}

#[test]
fn round_trip_reproduces_tokens() -> anyhow::Result<()> {
    let line = "Carol,52";
    let mut r = reader(&format!("name,age\n{line}\n"));
    let person: Person = r.read_row_as()?;
    assert_eq!(format!("{},{}", person.name, person.age), line);
    Ok(())
}

#[test]
fn shared_cache_is_released_on_close() -> anyhow::Result<()> {
    let cache = Arc::new(MappingCache::new());

    let mut keep = CsvReader::new(
        Cursor::new(b"name,age\nA,1\n".to_vec()),
        CsvConfig {
            release_cache_on_dispose: false,
            ..Default::default()
        },
    )?
    .with_cache(cache.clone());
    let _: Person = keep.read_row_as()?;
    keep.close();
    assert_eq!(cache.len(), 1);

    let mut other = reader("age,name\n2,B\n").with_cache(cache.clone());
    let person: Person = other.read_row_as()?;
    assert_eq!((person.name.as_str(), person.age), ("B", 2));
    assert_eq!(cache.len(), 2);

    drop(other);
    assert!(cache.is_empty());
    Ok(())
}
