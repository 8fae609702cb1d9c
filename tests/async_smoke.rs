use async_compression::tokio::write::GzipEncoder;
use csv_bind::{
    decode_source, open_source, AsyncCsvReader, Bindings, CancellationToken, Compression,
    CsvConfig, CsvError, CsvRecord, Row, SourceMeta,
};
use futures::{StreamExt, TryStreamExt};
use std::io::Cursor;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Default, PartialEq)]
struct Person {
    name: String,
    age: u32,
}

impl CsvRecord for Person {
    fn bindings() -> Bindings<Self> {
        Bindings::new()
            .bind("name", "name", |p: &mut Person, v| p.name = v)
            .bind("age", "age", |p: &mut Person, v| p.age = v)
    }
}

fn people(text: &str) -> anyhow::Result<AsyncCsvReader<Cursor<Vec<u8>>>> {
    Ok(AsyncCsvReader::new(
        Cursor::new(text.as_bytes().to_vec()),
        CsvConfig::default(),
    )?)
}

async fn gzip(text: &str) -> anyhow::Result<Vec<u8>> {
    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(text.as_bytes()).await?;
    encoder.shutdown().await?;
    Ok(encoder.into_inner())
}

#[tokio::test]
async fn async_rows_match_sync_semantics() -> anyhow::Result<()> {
    let source = Cursor::new(b"1,2,3\n4,5,6\n".to_vec());
    let mut reader = AsyncCsvReader::new(source, CsvConfig::headerless())?;

    assert_eq!(*reader.headers().await?, ["column 1", "column 2", "column 3"]);
    assert!(reader.has_more_rows().await?);
    let first = reader.read_row().await?;
    assert_eq!(first.values(), ["1", "2", "3"]);
    let rest: Vec<Row> = reader.read_rows().try_collect().await?;
    assert_eq!(rest.len(), 1);
    assert_eq!(&rest[0]["column 3"], "6");
    assert!(matches!(reader.read_row().await, Err(CsvError::NoMoreRows)));
    Ok(())
}

#[tokio::test]
async fn parses_gzip_and_counts_rows() -> anyhow::Result<()> {
    let mut text = String::from("sku,col1\n");
    for i in 0..50_000 {
        text.push_str(&format!("SKU{i:06},{i}\n"));
    }
    let dir = tempfile::tempdir()?;
    let gz_path = dir.path().join("tiny.csv.gz");
    tokio::fs::write(&gz_path, gzip(&text).await?).await?;

    let (source, meta) = open_source(&gz_path).await?;
    assert_eq!(meta.compression, Compression::Gzip);
    let mut reader = AsyncCsvReader::new(source, CsvConfig::default())?;
    assert_eq!(*reader.headers().await?, ["sku", "col1"]);

    let count = reader
        .read_rows()
        .try_fold(0u64, |n, row| async move {
            assert_eq!(row.field("sku")?, format!("SKU{n:06}"));
            Ok(n + 1)
        })
        .await?;
    assert_eq!(count, 50_000);
    Ok(())
}

#[tokio::test]
async fn transcodes_legacy_charset() -> anyhow::Result<()> {
    let meta = SourceMeta {
        charset: encoding_rs::WINDOWS_1252,
        ..Default::default()
    };
    let raw = Cursor::new(b"name;city\nJos\xe9;M\xe1laga\n".to_vec());
    let config = CsvConfig {
        separator: ';',
        ..Default::default()
    };
    let mut reader = AsyncCsvReader::new(decode_source(raw, &meta), config)?;
    let row = reader.read_row().await?;
    assert_eq!(row.values(), ["José", "Málaga"]);
    Ok(())
}

#[tokio::test]
async fn reads_from_path_and_resets() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("plain.csv");
    tokio::fs::write(&path, "a,b\n1,2\n3,4\n").await?;

    let mut reader = AsyncCsvReader::from_path(&path, CsvConfig::default()).await?;
    let first: Vec<Row> = reader.read_rows().try_collect().await?;
    reader.reset().await?;
    let second: Vec<Row> = reader.read_rows().try_collect().await?;
    let flat = |rows: &[Row]| rows.iter().map(|r| r.values().to_vec()).collect::<Vec<_>>();
    assert_eq!(flat(&first), flat(&second));
    assert!(reader.close().is_none());
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_stream_between_rows() -> anyhow::Result<()> {
    let token = CancellationToken::new();
    let source = Cursor::new(b"h\n1\n2\n3\n".to_vec());
    let mut reader =
        AsyncCsvReader::new(source, CsvConfig::default())?.with_cancellation(token.clone());

    let rows = reader.read_rows();
    futures::pin_mut!(rows);
    assert_eq!(&rows.next().await.expect("row")?[0], "1");
    token.cancel();
    assert!(matches!(rows.next().await, Some(Err(CsvError::Cancelled))));
    assert!(rows.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn binds_typed_rows_by_name() -> anyhow::Result<()> {
    let mut reader = people("name,age\nAlice,30\n")?;
    let person: Person = reader.read_row_as().await?;
    assert_eq!(
        person,
        Person {
            name: "Alice".into(),
            age: 30,
        }
    );
    assert!(matches!(
        reader.read_row_as::<Person>().await,
        Err(CsvError::NoMoreRows)
    ));
    Ok(())
}

#[tokio::test]
async fn typed_read_reports_unparsable_value() -> anyhow::Result<()> {
    let mut reader = people("name,age\nA,30\nB,x\n")?;
    assert_eq!(reader.read_row_as::<Person>().await?.age, 30);
    match reader.read_row_as::<Person>().await {
        Err(CsvError::FieldConversion { field, value, .. }) => {
            assert_eq!(field, "age");
            assert_eq!(value, "x");
        }
        other => panic!("expected conversion error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn typed_stream_continues_past_conversion_errors() -> anyhow::Result<()> {
    let mut reader = people("name,age\nA,1\nB,x\nC,3\n")?;
    let results: Vec<_> = reader.read_rows_as::<Person>().collect().await;
    assert_eq!(results.len(), 3);
    assert!(matches!(results[1], Err(CsvError::FieldConversion { .. })));
    assert_eq!(results[2].as_ref().map(|p| p.age).ok(), Some(3));
    Ok(())
}

#[tokio::test]
async fn typed_stream_stops_on_missing_column() -> anyhow::Result<()> {
    let mut reader = people("name,years\nA,1\nB,2\n")?;
    let results: Vec<_> = reader.read_rows_as::<Person>().collect().await;
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        Err(CsvError::ColumnNotSpecified { field: "age", .. })
    ));
    Ok(())
}
