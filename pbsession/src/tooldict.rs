// Read the host/tool mapping from a json file.
//
// The file format is an object { ... } whose keys are host names and whose values are arrays [...]
// of tool names, eg
//
//   { "localhost": ["sar", "iostat"], "ml8.hpc.uio.no": ["mpstat"] }
//
// Host names are either "localhost", the name of the local host, or the name of a remote host.  The
// order of hosts and tools in the file is the order of registration.

use crate::error::{Result, SessionError};
use crate::hosts::HostToolMap;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

// As for the system config files in sonalyze, the input is human-generated, so decode the generic
// JSON value explicitly to get decent error messages.

pub fn read_from_json(filename: &Path) -> Result<HostToolMap> {
    let file = File::open(filename).map_err(|e| {
        SessionError::Config(format!(
            "Tool mapping file '{}' not found or unreadable: {e}",
            filename.display()
        ))
    })?;
    let v: Value = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        SessionError::Config(format!(
            "Tool mapping file '{}' is not valid json: {e}",
            filename.display()
        ))
    })?;
    parse_value(v)
}

pub fn parse_value(v: Value) -> Result<HostToolMap> {
    let mut m = HostToolMap::new();
    if let Value::Object(fields) = v {
        for (host, tools) in fields {
            if host.is_empty() {
                return Err(bad("Host names must not be empty"));
            }
            if let Value::Array(tools) = tools {
                let mut names = vec![];
                for tool in tools {
                    if let Value::String(t) = tool {
                        names.push(t);
                    } else {
                        return Err(bad(&format!("Tools for host '{host}' must be strings")));
                    }
                }
                m.insert(&host, names);
            } else {
                return Err(bad(&format!("Host '{host}' must map to an array of tool names")));
            }
        }
    } else {
        return Err(bad("Expected an object value"));
    }
    Ok(m)
}

fn bad(msg: &str) -> SessionError {
    SessionError::Config(format!("Tool mapping: {msg}"))
}

#[test]
fn test_parse_value() {
    let v = serde_json::from_str(r#"{ "zeta": ["sar"], "alpha": ["iostat", "mpstat"] }"#).unwrap();
    let m = parse_value(v).unwrap();
    // File order, not sorted
    assert!(m.hosts().eq(vec!["zeta", "alpha"]));
    assert!(m.pairs().eq(vec![
        ("zeta", "sar"),
        ("alpha", "iostat"),
        ("alpha", "mpstat")
    ]));

    let v = serde_json::from_str(r#"["sar"]"#).unwrap();
    assert!(matches!(parse_value(v), Err(SessionError::Config(_))));

    let v = serde_json::from_str(r#"{ "ml8": "sar" }"#).unwrap();
    assert!(parse_value(v).is_err());

    let v = serde_json::from_str(r#"{ "ml8": ["sar", 3] }"#).unwrap();
    assert!(parse_value(v).is_err());
}

#[test]
fn test_read_missing_file() {
    let e = read_from_json(Path::new("/nonexistent/tools.json")).unwrap_err();
    assert!(e.to_string().contains("not found or unreadable"));
}
