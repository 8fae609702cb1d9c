use clap::{Arg, ArgAction, Command};
use crc32fast::Hasher as Crc32;
use csv_bind::{open_source, AsyncCsvReader, Bindings, CsvConfig, CsvReader, CsvRecord, Row};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Shape written by the `gen` binary.
#[derive(Debug, Default)]
struct Sample {
    id: u64,
    name: String,
    age: u32,
    score: f64,
    active: bool,
}

impl CsvRecord for Sample {
    fn bindings() -> Bindings<Self> {
        Bindings::new()
            .bind("id", "id", |s: &mut Sample, v| s.id = v)
            .bind("name", "name", |s: &mut Sample, v| s.name = v)
            .bind("age", "age", |s: &mut Sample, v| s.age = v)
            .bind("score", "score", |s: &mut Sample, v| s.score = v)
            .bind("active", "active", |s: &mut Sample, v| s.active = v)
    }
}

#[derive(Default)]
struct Tally {
    rows: u64,
    crc: Option<Crc32>,
    age_total: u64,
}

impl Tally {
    fn row(&mut self, row: &Row, required: &[String]) -> anyhow::Result<()> {
        self.rows += 1;
        for name in required {
            row.field(name)?;
        }
        if let Some(crc) = self.crc.as_mut() {
            // fields separated by '\x1f' (unit separator), rows by '\x1e'
            for (i, field) in row.iter().enumerate() {
                if i > 0 {
                    crc.update(&[0x1f]);
                }
                crc.update(field.as_bytes());
            }
            crc.update(&[0x1e]);
        }
        Ok(())
    }

    fn sample(&mut self, sample: &Sample) {
        self.rows += 1;
        self.age_total += u64::from(sample.age);
        if let Some(crc) = self.crc.as_mut() {
            crc.update(&sample.id.to_le_bytes());
            crc.update(sample.name.as_bytes());
            crc.update(&sample.score.to_le_bytes());
            crc.update(&[sample.active as u8, 0x1e]);
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("csv_bind={level},bench={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("bench")
        .arg(Arg::new("path").long("path").required(true).value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("required").long("required").action(ArgAction::Append).help("Column that must resolve on every row"))
        .arg(Arg::new("separator").long("separator").value_parser(clap::value_parser!(char)).default_value(","))
        .arg(Arg::new("no-header").long("no-header").help("First line is data; synthesize column names").action(ArgAction::SetTrue))
        .arg(Arg::new("strict").long("strict").help("Fail rows whose width differs from the header").action(ArgAction::SetTrue))
        .arg(Arg::new("verify").long("verify").help("CRC32 over every field").action(ArgAction::SetTrue))
        .arg(Arg::new("typed").long("typed").help("Bind rows into the gen sample record").action(ArgAction::SetTrue))
        .arg(Arg::new("async").long("async").help("Read through the async reader (handles .gz/.zst)").action(ArgAction::SetTrue))
        .arg(Arg::new("limit").long("limit").help("Stop after N rows").value_parser(clap::value_parser!(u64)))
        .arg(Arg::new("verbose").long("verbose").short('v').action(ArgAction::SetTrue))
        .get_matches();

    setup_logging(matches.get_flag("verbose"));

    let path = matches.get_one::<PathBuf>("path").expect("required").clone();
    let required: Vec<String> = matches
        .get_many::<String>("required")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();
    let limit = matches.get_one::<u64>("limit").copied().unwrap_or(u64::MAX);
    let config = CsvConfig {
        separator: *matches.get_one::<char>("separator").expect("defaulted"),
        first_line_is_header: !matches.get_flag("no-header"),
        strict_row_width: matches.get_flag("strict"),
        ..Default::default()
    };
    let typed = matches.get_flag("typed");

    let mut tally = Tally {
        crc: matches.get_flag("verify").then(Crc32::new),
        ..Default::default()
    };

    let start = Instant::now();
    let headers = if matches.get_flag("async") {
        let (source, meta) = open_source(&path).await?;
        debug!(?meta, "opened source");
        let mut reader = AsyncCsvReader::new(source, config)?;
        let headers = reader.headers().await?.names().to_vec();
        if typed {
            let records = reader.read_rows_as::<Sample>();
            futures::pin_mut!(records);
            while let Some(sample) = records.next().await {
                tally.sample(&sample?);
                if tally.rows >= limit {
                    break;
                }
            }
        } else {
            let rows = reader.read_rows();
            futures::pin_mut!(rows);
            while let Some(row) = rows.next().await {
                tally.row(&row?, &required)?;
                if tally.rows >= limit {
                    break;
                }
            }
        }
        headers
    } else {
        let mut reader = CsvReader::from_path(&path, config)?;
        let headers = reader.headers()?.names().to_vec();
        if typed {
            for sample in reader.read_rows_as::<Sample>() {
                tally.sample(&sample?);
                if tally.rows >= limit {
                    break;
                }
            }
        } else {
            for row in reader.read_rows() {
                tally.row(&row?, &required)?;
                if tally.rows >= limit {
                    break;
                }
            }
        }
        reader.close();
        headers
    };

    let elapsed = start.elapsed().as_secs_f64();
    let rps = (tally.rows as f64) / elapsed;
    info!(
        source = %path.display(),
        rows = tally.rows,
        elapsed_s = elapsed,
        rows_per_sec = rps,
        "done"
    );
    println!(
        "source={} rows={} headers={:?}\nelapsed={:.1}s rows/sec={:.0}",
        path.display(),
        tally.rows,
        headers,
        elapsed,
        rps
    );
    if let Some(crc) = tally.crc {
        println!("crc=0x{:08x}", crc.finalize());
    }
    if typed && tally.rows > 0 {
        println!("mean_age={:.2}", tally.age_total as f64 / tally.rows as f64);
    }
    Ok(())
}
