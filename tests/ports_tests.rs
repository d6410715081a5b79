use netrecon::error::InputError;
use netrecon::ports::{load_ports_from_path, parse_port, parse_ports_str};

#[test]
fn comment_only_and_blank_lines_yield_nothing() {
    let ports = parse_ports_str("\n   # nothing here\n\t\n#22\n").unwrap();
    assert!(ports.is_empty());
}

#[test]
fn zero_and_garbage_are_invalid_ports() {
    assert!(matches!(parse_port("0"), Err(InputError::InvalidPort { .. })));
    assert!(matches!(parse_port("-1"), Err(InputError::InvalidPort { .. })));
    assert!(matches!(
        parse_ports_str("25\nsmtp\n"),
        Err(InputError::PortsFile { line: 2, .. })
    ));
    assert!(matches!(
        parse_ports_str("8080-\n"),
        Err(InputError::PortsFile { line: 1, .. })
    ));
}

#[test]
fn load_from_file_and_reject_empty_lists() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("netrecon-ports-{}.txt", std::process::id()));
    std::fs::write(&path, "21-23\n3389\n").unwrap();
    assert_eq!(load_ports_from_path(&path).unwrap(), vec![21, 22, 23, 3389]);

    std::fs::write(&path, "# nothing here\n").unwrap();
    assert!(matches!(load_ports_from_path(&path), Err(InputError::EmptyPortList)));

    std::fs::remove_file(&path).unwrap();
    assert!(matches!(
        load_ports_from_path(&path),
        Err(InputError::ReadPortsFile { .. })
    ));
}
