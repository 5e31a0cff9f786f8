//! Command line parsing for the cpuwatch front end.

use std::path::PathBuf;

pub const USAGE: &str = "[--processes NAME...|-p NAME...] [--interval SECS|-i SECS] [--filter PREFIX] [--names] [--db PATH|--no-db] [--rewrite-db] [--ticks N] [--rescan] [--json]";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    pub processes: Vec<String>,
    pub interval_secs: Option<u64>,
    pub filter: Option<String>,
    pub names: bool,
    pub db: Option<PathBuf>,
    pub no_db: bool,
    pub rewrite_db: bool,
    pub ticks: Option<usize>,
    pub rescan: bool,
    pub json: bool,
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} {USAGE}\n\n\
         Interactive commands (stdin): pause, resume, status, stop|quit"
    )
}

/// Parses `args` (program name first). `Err` carries the text to print: usage for
/// `--help`, otherwise a short complaint followed by usage.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter().peekable();
    let prog = it.next().unwrap_or_else(|| "cpuwatch".into());
    let mut parsed = ParsedArgs::default();

    let bad = |msg: String| format!("{msg}\n{}", usage(&prog));

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--processes" | "-p" => {
                // nargs+: take everything up to the next flag
                let before = parsed.processes.len();
                while let Some(next) = it.next_if(|a| !a.starts_with('-')) {
                    parsed.processes.push(next);
                }
                if parsed.processes.len() == before {
                    return Err(bad(format!("{arg} expects at least one process name")));
                }
            }
            "--interval" | "-i" => {
                let v = it.next().ok_or_else(|| bad(format!("{arg} expects a value")))?;
                parsed.interval_secs = Some(parse_interval(&v).map_err(bad)?);
            }
            "--filter" => {
                // an empty prefix lists everything
                parsed.filter = Some(it.next_if(|a| !a.starts_with('-')).unwrap_or_default());
            }
            "--names" => parsed.names = true,
            "--db" => {
                let v = it.next().ok_or_else(|| bad("--db expects a path".into()))?;
                parsed.db = Some(PathBuf::from(v));
            }
            "--no-db" => parsed.no_db = true,
            "--rewrite-db" => parsed.rewrite_db = true,
            "--ticks" => {
                let v = it.next().ok_or_else(|| bad("--ticks expects a count".into()))?;
                let n = v
                    .parse::<usize>()
                    .map_err(|_| bad(format!("invalid tick count: {v}")))?;
                parsed.ticks = Some(n);
            }
            "--rescan" => parsed.rescan = true,
            "--json" => parsed.json = true,
            _ if arg.starts_with("--interval=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    parsed.interval_secs = Some(parse_interval(v).map_err(bad)?);
                }
            }
            _ if arg.starts_with("--db=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.db = Some(PathBuf::from(v));
                    }
                }
            }
            _ => return Err(bad(format!("Unexpected argument: {arg}"))),
        }
    }

    if parsed.no_db && parsed.db.is_some() {
        return Err(bad("--db and --no-db are mutually exclusive".into()));
    }
    Ok(parsed)
}

/// Whole seconds, at least one.
pub fn parse_interval(v: &str) -> Result<u64, String> {
    match v.trim().parse::<u64>() {
        Ok(secs) if secs >= 1 => Ok(secs),
        _ => Err(format!("invalid interval: {v} (whole seconds, at least 1)")),
    }
}
