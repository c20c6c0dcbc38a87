use rush::Runner;

/// A runner can execute the same parsed program repeatedly.
#[test]
fn repeat_run() {
    let runner = Runner::new("1 + 2").unwrap();
    assert_eq!(runner.run().unwrap().inspect(), "3");
    assert_eq!(runner.run().unwrap().inspect(), "3");
}

#[test]
fn string_result() {
    let runner = Runner::new("'foo' + \"bar\"").unwrap();
    assert_eq!(runner.run().unwrap().inspect(), "foobar");
}

#[test]
fn syntax_errors_are_returned_as_a_list() {
    let errors = Runner::new("x = * 2").unwrap_err();
    assert!(!errors.is_empty());
    assert!(errors[0].message.contains("no prefix parse function"));
}

#[test]
fn deterministic_rng_seed() {
    let source = "[random_int(1000), random_int(1000), random_int(1000)]";
    let a = Runner::new(source).unwrap().with_rng_seed(7).run().unwrap().inspect();
    let b = Runner::new(source).unwrap().with_rng_seed(7).run().unwrap().inspect();
    assert_eq!(a, b);
}
