/// Mapping from host names to the collection tools registered on them.
///
/// The map keeps the order of the input file, both for hosts and for the tools of each host, and
/// registration proceeds in that order.  It is loaded once before a session and not changed
/// afterwards.
///
/// A host is "local" if it is the literal alias `localhost` or if it equals the name of the host we
/// are running on.  Local hosts are registered without `--remote`.

pub const LOCALHOST: &str = "localhost";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostToolMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HostToolMap {
    /// Create a new, empty map.

    pub fn new() -> HostToolMap {
        HostToolMap { entries: vec![] }
    }

    /// Add a host with its tools.  A host that is already present gets the tools appended.

    pub fn insert(&mut self, host: &str, tools: Vec<String>) {
        if let Some((_, ts)) = self.entries.iter_mut().find(|(h, _)| h == host) {
            ts.extend(tools);
        } else {
            self.entries.push((host.to_string(), tools));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(h, _)| h.as_str())
    }

    /// All (host, tool) pairs in registration order.

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(h, ts)| ts.iter().map(move |t| (h.as_str(), t.as_str())))
    }

    /// Return the first host that is not local, if any.

    pub fn first_remote(&self, local_host: &str) -> Option<&str> {
        self.hosts().find(|h| !is_local(h, local_host))
    }
}

pub fn is_local(host: &str, local_host: &str) -> bool {
    host == LOCALHOST || host == local_host
}

/// The name of the host we're running on, as reported by `hostname`, or "localhost" if that can't
/// be determined.

pub fn local_hostname() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| LOCALHOST.to_string())
}

#[test]
fn test_host_tool_map() {
    let mut m = HostToolMap::new();
    assert!(m.is_empty());
    m.insert("ml8", vec!["sar".to_string(), "iostat".to_string()]);
    m.insert("localhost", vec!["vmstat".to_string()]);
    m.insert("ml8", vec!["mpstat".to_string()]);

    assert!(m.hosts().eq(vec!["ml8", "localhost"]));
    assert!(m.pairs().eq(vec![
        ("ml8", "sar"),
        ("ml8", "iostat"),
        ("ml8", "mpstat"),
        ("localhost", "vmstat")
    ]));

    // Every host is local when we are ml8
    assert_eq!(m.first_remote("ml8"), None);
    assert_eq!(m.first_remote("ml3"), Some("ml8"));
}
