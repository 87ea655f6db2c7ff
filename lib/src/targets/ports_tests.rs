use super::*;

#[test]
fn returns_new_port_targets() {
    let list = vec![String::from("1"), String::from("2"), String::from("3")];
    let targets = PortTargets::new(list).unwrap();
    assert!(!targets.is_empty());
}

#[test]
fn returns_port_target_len() {
    let list = vec![String::from("1"), String::from("2"), String::from("3-5")];
    let targets = PortTargets::new(list).unwrap();
    assert_eq!(targets.len(), 5);
}

#[test]
fn lazy_loops_ports() {
    let list = vec![String::from("1"), String::from("2-4")];

    let expected = [1, 2, 3, 4];

    let targets = PortTargets::new(list).unwrap();

    let mut idx = 0;

    let assert_ports = |port: u16| {
        assert_eq!(port, expected[idx]);
        idx += 1;
        Ok(())
    };

    targets.lazy_loop(assert_ports).unwrap();
    assert_eq!(idx, expected.len());
}

#[test]
fn covers_all_and_privileged_ports() {
    assert_eq!(PortTargets::all().len(), 65535);
    assert_eq!(PortTargets::privileged().len(), 1023);

    let mut last = 0;
    PortTargets::privileged()
        .lazy_loop(|p| {
            last = p;
            Ok(())
        })
        .unwrap();
    assert_eq!(last, 1023);
}

#[test]
fn returns_error_for_malformed_port() {
    let res = PortTargets::new(vec![String::from("nope")]);
    assert!(matches!(res, Err(NetToolsError::InvalidInput(_))));
}

#[test]
fn returns_error_for_port_zero() {
    let res = PortTargets::new(vec![String::from("0")]);
    assert!(matches!(res, Err(NetToolsError::InvalidInput(_))));

    let res = PortTargets::new(vec![String::from("0-10")]);
    assert!(res.is_err());
}

#[test]
fn returns_error_for_out_of_range_port() {
    let res = PortTargets::new(vec![String::from("65536")]);
    assert!(res.is_err());
}

#[test]
fn returns_error_for_inverted_range() {
    let res = PortTargets::new(vec![String::from("100-10")]);
    assert!(matches!(res, Err(NetToolsError::InvalidInput(_))));
}

#[test]
fn returns_error_for_malformed_range_start() {
    let res = PortTargets::new(vec![String::from("nope-3")]);
    assert!(res.is_err());
}

#[test]
fn returns_error_for_malformed_range_end() {
    let res = PortTargets::new(vec![String::from("4-nope")]);
    assert!(res.is_err());
}
