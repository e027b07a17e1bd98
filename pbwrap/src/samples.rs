// Print the samples of a finished session.

use crate::format;
use crate::PrintArgs;

use anyhow::{bail, Result};
use pbsession::SampleResult;
use std::collections::HashMap;
use std::io;

const DEFAULT_FIELDS: &str = "iter,sample,start,duration,dir";

type Formatter = Box<dyn Fn(&SampleResult) -> String>;

fn formatters() -> HashMap<String, Formatter> {
    let tfmt = "%Y-%m-%d %H:%M:%S";
    let mut m: HashMap<String, Formatter> = HashMap::new();
    m.insert("iter".to_string(), Box::new(|s: &SampleResult| s.iteration.to_string()));
    m.insert("sample".to_string(), Box::new(|s: &SampleResult| s.sample.to_string()));
    m.insert("dir".to_string(), Box::new(|s: &SampleResult| s.dir.display().to_string()));
    m.insert(
        "start".to_string(),
        Box::new(move |s: &SampleResult| s.started.format(tfmt).to_string()),
    );
    m.insert(
        "stop".to_string(),
        Box::new(move |s: &SampleResult| s.stopped.format(tfmt).to_string()),
    );
    m.insert(
        "duration".to_string(),
        Box::new(|s: &SampleResult| format!("{}s", (s.stopped - s.started).num_seconds())),
    );
    m
}

pub fn print_samples(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    samples: &[SampleResult],
) -> Result<()> {
    if print_args.json {
        let v = samples
            .iter()
            .map(|s| {
                serde_json::json!({
                    "iteration": s.iteration,
                    "sample": s.sample,
                    "dir": s.dir.display().to_string(),
                    "start": s.started.to_rfc3339(),
                    "stop": s.stopped.to_rfc3339(),
                })
            })
            .collect::<Vec<_>>();
        writeln!(output, "{}", serde_json::to_string_pretty(&v)?)?;
        return Ok(());
    }

    let formatters = formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(DEFAULT_FIELDS);
    let (fields, others) = format::parse_fields(spec, &formatters);
    if !others.is_empty() {
        let mut unknown = others.into_iter().collect::<Vec<&str>>();
        unknown.sort();
        bail!("Unknown field(s) in --fmt: {}", unknown.join(","));
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    format::format_data(
        output,
        &fields,
        &formatters,
        !print_args.no_header,
        print_args.csv,
        samples,
    )?;
    Ok(())
}
