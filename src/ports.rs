use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::InputError;

/// Parse a single TCP port (1..=65535).
pub fn parse_port(s: &str) -> Result<u16, InputError> {
    let s = s.trim();
    let val: u32 = s.parse().map_err(|e: std::num::ParseIntError| InputError::InvalidPort {
        value: s.to_string(),
        reason: e.to_string(),
    })?;
    if val == 0 || val > 65535 {
        return Err(InputError::InvalidPort {
            value: s.to_string(),
            reason: "out of range 1-65535".into(),
        });
    }
    Ok(val as u16)
}

/// Parse ports file content into a deduplicated list of TCP ports.
///
/// Supported formats per line:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>, InputError> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        let at_line = |e: InputError| InputError::PortsFile {
            line: line_no,
            reason: e.to_string(),
        };

        if let Some((a, b)) = line.split_once('-') {
            let start = parse_port(a).map_err(at_line)?;
            let end = parse_port(b).map_err(at_line)?;
            if start > end {
                return Err(at_line(InputError::InvalidRange { start, end }));
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        let p = parse_port(line).map_err(at_line)?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    Ok(out)
}

/// Load a non-empty port list from a file.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>, InputError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| InputError::ReadPortsFile {
        path: path.to_path_buf(),
        source,
    })?;
    let ports = parse_ports_str(&content)?;
    if ports.is_empty() {
        return Err(InputError::EmptyPortList);
    }
    Ok(ports)
}
