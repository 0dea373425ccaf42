mod util;

use assert_cmd::Command;
use classfile::ClassFile;
use util::{counter, scratch, write_class};

fn cli() -> Command {
    let mut command = Command::cargo_bin("cli").expect("cargo to locate cli");
    command.arg("--plain");
    command
}

fn stdout_of(output: &[u8]) -> String {
    String::from_utf8_lossy(output).to_string()
}

#[test]
fn it_prints_a_listing() {
    let dir = scratch("cli-print").unwrap();
    let path = write_class(&dir, "Counter", &counter().unwrap().write()).unwrap();

    let assert = cli().arg("print").arg(&path).assert().success();
    let out = stdout_of(&assert.get_output().stdout);
    assert!(out.starts_with("class Counter extends java/lang/Object"));
    assert!(out.contains("inc()V"));
    assert!(out.contains("getfield #"));
    assert!(out.contains("// Counter.x:I"));
}

#[test]
fn it_verifies_classes() {
    let dir = scratch("cli-verify").unwrap();
    let bytes = counter().unwrap().write();
    let good = write_class(&dir, "Counter", &bytes).unwrap();
    let bad = write_class(&dir, "Broken", &bytes[..bytes.len() / 2]).unwrap();

    let assert = cli().arg("verify").arg(&good).assert().success();
    assert!(stdout_of(&assert.get_output().stdout).starts_with("ok "));

    let assert = cli().arg("verify").arg(&good).arg(&bad).assert().failure();
    let out = stdout_of(&assert.get_output().stdout);
    assert!(out.contains("FAILED"));
    assert!(out.contains("Broken.class"));
}

#[test]
fn it_enhances_from_flags() {
    let dir = scratch("cli-enhance").unwrap();
    let input = write_class(&dir, "Counter", &counter().unwrap().write()).unwrap();
    let output = dir.join("Enhanced.class");

    cli()
        .arg("enhance")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .args(["--interface", "java/io/Serializable"])
        .args(["--add-field", "x$rc:I"])
        .args(["--manage", "x"])
        .assert()
        .success();

    let class = ClassFile::read(&std::fs::read(&output).unwrap()).unwrap();
    let pool = &class.constant_pool;
    assert_eq!(class.interface_names().unwrap(), vec!["java/io/Serializable".to_string()]);
    assert!(class.fields.locate(pool, "x$rc", Some("I")).is_some());
    assert!(class.methods.locate(pool, "x$get", "(LCounter;)I").is_some());
    assert!(class.methods.locate(pool, "x$set", "(LCounter;I)V").is_some());
}

#[test]
fn it_reports_enhancement_failures() {
    let dir = scratch("cli-enhance-failure").unwrap();
    let input = write_class(&dir, "Counter", &counter().unwrap().write()).unwrap();
    let output = dir.join("Enhanced.class");

    cli()
        .arg("enhance")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(["--manage", "missing"])
        .assert()
        .failure();

    assert!(!output.exists());
}
