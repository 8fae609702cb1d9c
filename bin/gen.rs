use clap::{Arg, ArgAction, Command};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Writes a synthetic CSV to stdout: id,name,age,score,active plus filler columns")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("no_header")
                .long("no-header")
                .help("Omit the header line")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("extra")
                .long("extra")
                .help("Number of filler columns after the fixed ones")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("separator")
                .long("separator")
                .value_parser(clap::value_parser!(char))
                .default_value(","),
        )
        .get_matches();

    let rows: u64 = *matches.get_one("rows").expect("required");
    let with_header = !matches.get_flag("no_header");
    let extra: usize = *matches.get_one("extra").expect("defaulted");
    let sep: char = *matches.get_one("separator").expect("defaulted");
    anyhow::ensure!(sep.is_ascii() && sep != '\n', "separator must be a single ASCII character");

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        write!(&mut out, "id{sep}name{sep}age{sep}score{sep}active")?;
        for i in 1..=extra {
            write!(&mut out, "{sep}extra{i}")?;
        }
        writeln!(&mut out)?;
    }

    // Deterministic values so runs can be compared by checksum
    for i in 0..rows {
        let age = 18 + i % 60;
        let score = (i % 1000) as f64 / 10.0;
        let active = i % 3 == 0;
        write!(
            &mut out,
            "{i}{sep}user{i:08}{sep}{age}{sep}{score:.1}{sep}{active}"
        )?;
        for c in 1..=extra {
            write!(&mut out, "{sep}v{c}_{i}")?;
        }
        writeln!(&mut out)?;
    }

    out.flush()?;
    Ok(())
}
