use std::collections::BTreeMap;

/// Well-known ports probed by `scan-common`.
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 1433, 3306, 3389, 5432, 5900, 6379, 8080,
];

const DEFAULT_SERVICES: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (6379, "Redis"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
    (9200, "Elasticsearch"),
    (27017, "MongoDB"),
];

/// Immutable port -> service name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCatalog {
    entries: BTreeMap<u16, String>,
}

impl ServiceCatalog {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, S)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(p, s)| (p, s.into())).collect(),
        }
    }

    pub fn lookup(&self, port: u16) -> Option<&str> {
        self.entries.get(&port).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::from_entries(DEFAULT_SERVICES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_knows_ssh_and_rdp() {
        let c = ServiceCatalog::default();
        assert_eq!(c.lookup(22), Some("SSH"));
        assert_eq!(c.lookup(3389), Some("RDP"));
        assert_eq!(c.lookup(1), None);
    }

    #[test]
    fn every_common_port_has_a_name() {
        let c = ServiceCatalog::default();
        for p in COMMON_PORTS {
            assert!(c.lookup(*p).is_some(), "no service for {p}");
        }
    }

    #[test]
    fn custom_table_replaces_defaults() {
        let c = ServiceCatalog::from_entries([(2222, "SSH")]);
        assert_eq!(c.len(), 1);
        assert_eq!(c.lookup(2222), Some("SSH"));
        assert_eq!(c.lookup(22), None);
    }
}
