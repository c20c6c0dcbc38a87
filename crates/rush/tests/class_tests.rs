//! Classes, instances, method resolution and `super`.

use pretty_assertions::assert_eq;
use rush::{Runner, Value};

fn run(source: &str) -> Value {
    Runner::new(source)
        .unwrap_or_else(|errors| panic!("syntax errors in {source:?}: {errors:?}"))
        .run()
        .unwrap_or_else(|err| panic!("runtime error in {source:?}: {err}"))
}

fn run_inspect(source: &str) -> String {
    run(source).inspect()
}

fn run_err(source: &str) -> rush::RushError {
    Runner::new(source)
        .unwrap_or_else(|errors| panic!("syntax errors in {source:?}: {errors:?}"))
        .run()
        .expect_err("expected a runtime error")
}

#[test]
fn constructor_and_instance_variables() {
    let source = "class C { fn initialize(x){@x=x} fn get(){return @x} }; C.new(7).get()";
    assert_eq!(run_inspect(source), "7");
}

#[test]
fn instances_have_independent_state() {
    let source = "
        class Counter {
            fn initialize() { @count = 0 }
            fn bump() { @count = @count + 1 }
            fn count() { @count }
        }
        a = Counter.new()
        b = Counter.new()
        a.bump(); a.bump(); b.bump()
        [a.count(), b.count()]";
    assert_eq!(run_inspect(source), "[2, 1]");
}

#[test]
fn unset_instance_variable_reads_null() {
    let source = "class C { fn get() { @missing } }; C.new().get()";
    assert_eq!(run_inspect(source), "null");
}

#[test]
fn methods_dispatch_along_the_chain() {
    let source = "
        class Animal {
            fn speak() { \"...\" }
            fn name() { \"animal\" }
        }
        class Dog < Animal {
            fn speak() { \"woof\" }
        }
        d = Dog.new()
        [d.speak(), d.name()]";
    assert_eq!(run_inspect(source), "[woof, animal]");
}

#[test]
fn three_level_override_and_super() {
    // `super` dispatches to the same-named method one class up.
    let source = "
        class B { fn who() { \"B\" } }
        class C < B { fn who() { \"C\" } }
        class D < C { fn who() { \"D+\" + super() } }
        [D.new().who(), C.new().who(), B.new().who()]";
    assert_eq!(run_inspect(source), "[D+C, C, B]");
}

#[test]
fn super_without_matching_parent_method_is_an_error() {
    let err = run_err("class A { fn only() { super() } }; A.new().only()");
    assert_eq!(err.message, "no superclass method only for A");
}

#[test]
fn super_in_initialize() {
    let source = "
        class Base { fn initialize(x) { @x = x } }
        class Derived < Base {
            fn initialize(x, y) { super(x); @y = y }
            fn sum() { @x + @y }
        }
        Derived.new(3, 4).sum()";
    assert_eq!(run_inspect(source), "7");
}

#[test]
fn inherited_initialize_runs() {
    let source = "
        class Base { fn initialize() { @tag = \"base\" } fn tag() { @tag } }
        class Child < Base { }
        Child.new().tag()";
    assert_eq!(run_inspect(source), "base");
}

#[test]
fn methods_see_the_defining_scope() {
    let source = "
        offset = 100
        class Adder { fn add(n) { n + offset } }
        Adder.new().add(5)";
    assert_eq!(run_inspect(source), "105");
}

#[test]
fn constructor_arity_is_checked() {
    let err = run_err("class C { fn initialize(x) { @x = x } }; C.new()");
    assert_eq!(err.message, "wrong number of arguments: want=1, got=0");
    let err = run_err("class C { }; C.new(1)");
    assert_eq!(err.message, "wrong number of arguments: want=0, got=1");
}

#[test]
fn undefined_method_names_the_class() {
    let err = run_err("class C { }; C.new().nope()");
    assert_eq!(err.message, "undefined method nope for C");
}

#[test]
fn instance_variable_outside_method_is_an_error() {
    let err = run_err("@x = 1");
    assert_eq!(err.message, "instance variable @x used outside of object context");
}

#[test]
fn object_identity_equality() {
    let source = "class C { }; a = C.new(); b = C.new(); [a == a, a == b]";
    assert_eq!(run_inspect(source), "[true, false]");
}

#[test]
fn type_of_class_values() {
    assert_eq!(run_inspect("class C { }; type(C)"), "CLASS");
    assert_eq!(run_inspect("class C { }; type(C.new())"), "OBJECT");
    assert_eq!(run_inspect("class C { }; C.new()"), "#<Object:C>");
}

#[test]
fn bound_methods_are_first_class() {
    let source = "
        class Greeter {
            fn initialize(name) { @name = name }
            fn greet() { \"hi \" + @name }
        }
        m = Greeter.new(\"rush\").greet
        m()";
    assert_eq!(run_inspect(source), "hi rush");
}
