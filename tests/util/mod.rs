#![allow(dead_code)]

use std::{
    fs,
    io::Error,
    path::{Path, PathBuf},
    process::Command,
};

use classfile::code::builder::CodeBuilder;
use classfile::code::opcodes::{IADD, SWAP};
use classfile::flags::{FieldAccessFlags, MethodAccessFlags};
use classfile::{ClassFile, Result};
use enhancer::ClassEnhancer;
use support::descriptor::{BaseType, FieldType, MethodType};
use tracing::Level;

const TMP_DIR: &str = env!("CARGO_TARGET_TMPDIR");

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .without_time()
        .try_init();
}

/// A fresh directory under the cargo temp dir for one test.
pub fn scratch(name: &str) -> Result<PathBuf, Error> {
    let dir = PathBuf::from(TMP_DIR).join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn java_available() -> bool {
    let available = tool_available("java");
    if !available {
        eprintln!("java is not available, skipping");
    }
    available
}

pub fn javac_available() -> bool {
    let available = tool_available("javac") && tool_available("java");
    if !available {
        eprintln!("javac is not available, skipping");
    }
    available
}

/// Compile `source` as `name.java` into `dir`, returning the path of the class file.
pub fn compile(dir: &Path, name: &str, source: &str) -> Result<PathBuf, Error> {
    let source_path = dir.join(format!("{name}.java"));
    fs::write(&source_path, source)?;

    // javac takes args with this form:
    // javac --release N -encoding UTF-8 SOURCEFILE.java -d OUTPUT_DIR
    let compilation = Command::new("javac")
        .args(["--release", "17", "-encoding", "UTF-8"])
        .arg(&source_path)
        .arg("-d")
        .arg(dir)
        .output()?;

    if !compilation.status.success() {
        let stderr = String::from_utf8_lossy(&compilation.stderr);
        panic!("could not compile {}:\n{}", source_path.display(), stderr);
    }

    Ok(dir.join(format!("{name}.class")))
}

#[derive(Debug)]
pub struct Execution {
    out: Vec<String>,
    err: Vec<String>,
    code: i32,
}

impl PartialEq for Execution {
    // stderr is only compared through the exit code
    fn eq(&self, other: &Self) -> bool {
        self.out == other.out && self.code == other.code
    }
}

impl Execution {
    pub fn with_output(mut self, line: impl Into<String>) -> Self {
        self.out.push(line.into());
        self
    }

    pub fn has_success(mut self) -> Self {
        self.code = 0;
        self
    }
}

pub fn expected() -> Execution {
    Execution {
        out: vec![],
        err: vec![],
        code: 0,
    }
}

/// Run `class_name` from `dir` on the host JVM, with the bytecode verifier on.
pub fn execute(dir: &Path, class_name: &str) -> Result<Execution, Error> {
    let output = Command::new("java")
        .arg("-Xverify:all")
        .arg("-cp")
        .arg(dir)
        .arg(class_name)
        .output()?;

    let (out, err) = (
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );

    Ok(Execution {
        out: out.lines().map(|l| l.to_string()).collect(),
        err: err.lines().map(|l| l.to_string()).collect(),
        code: output.status.code().unwrap_or(-1),
    })
}

pub fn compare(got: Execution, expected: Execution) {
    if got.code != expected.code {
        eprintln!("Execution failed:");
        eprintln!("Stdout:\n{}", got.out.join("\n"));
        eprintln!("Stderr:\n{}", got.err.join("\n"));
        panic!("exit code {} != {}", got.code, expected.code);
    }

    assert_eq!(got.out, expected.out);
}

pub fn int() -> FieldType {
    FieldType::parse("I").unwrap()
}

pub fn void() -> FieldType {
    FieldType::Base(BaseType::Void)
}

pub fn method(descriptor: &str) -> MethodType {
    MethodType::parse(descriptor).unwrap()
}

/// Emit `System.out.println(int)` for the int on top of the stack.
fn println_int(code: &mut CodeBuilder) -> Result<()> {
    let out = FieldType::object("java/io/PrintStream");
    code.get_static("java/lang/System", "out", &out)?;
    // Stack is now value, out; swap them for the call
    code.raw(&[SWAP], 2, 2);
    code.invoke_virtual("java/io/PrintStream", "println", &method("(I)V"))?;
    Ok(())
}

/// ```java
/// public class Counter {
///     private int x;
///     public void inc() { x = x + 1; }
///     public int get() { return x; }
///     public static void main(String[] args) {
///         Counter c = new Counter();
///         c.inc();
///         c.inc();
///         System.out.println(c.get());
///     }
/// }
/// ```
pub fn counter() -> Result<ClassFile> {
    let mut enhancer = ClassEnhancer::new(ClassFile::new(49, "Counter", Some("java/lang/Object"))?);
    let counter = FieldType::object("Counter");
    enhancer.add_field("x", "I", FieldAccessFlags::PRIVATE)?;

    enhancer.add_method("<init>", "()V", MethodAccessFlags::PUBLIC, |code| {
        code.load_this();
        code.invoke_special("java/lang/Object", "<init>", &method("()V"))?;
        code.return_value(&void());
        Ok(())
    })?;

    enhancer.add_method("inc", "()V", MethodAccessFlags::PUBLIC, |code| {
        code.load_this().load_this().get_field("Counter", "x", &int())?;
        code.push_int(1)?.raw(&[IADD], 2, 1);
        code.put_field("Counter", "x", &int())?;
        code.return_value(&void());
        Ok(())
    })?;

    enhancer.add_method("get", "()I", MethodAccessFlags::PUBLIC, |code| {
        code.load_this().get_field("Counter", "x", &int())?;
        code.return_value(&int());
        Ok(())
    })?;

    enhancer.add_method(
        "main",
        "([Ljava/lang/String;)V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        |code| {
            code.new_instance("Counter")?.dup();
            code.invoke_special("Counter", "<init>", &method("()V"))?;
            code.store(&counter, 1);
            for _ in 0..2 {
                code.load(&counter, 1);
                code.invoke_virtual("Counter", "inc", &method("()V"))?;
            }
            code.load(&counter, 1);
            code.invoke_virtual("Counter", "get", &method("()I"))?;
            println_int(code)?;
            code.return_value(&void());
            Ok(())
        },
    )?;

    Ok(enhancer.into_class())
}

/// ```java
/// public class Loop {
///     static int run() {
///         int i = 0;
///         do { i++; } while (i < 10);
///         return i;
///     }
///     public static void main(String[] args) { System.out.println(run()); }
/// }
/// ```
///
/// `run` is laid out as
/// ```text
///  0: iconst_0
///  1: istore_0
///  2: iinc 0, 1
///  5: iload_0
///  6: bipush 10
///  8: if_icmplt 2
/// 11: iload_0
/// 12: ireturn
/// ```
pub fn looping() -> Result<ClassFile> {
    use classfile::code::opcodes::{BIPUSH, IF_ICMPLT, IINC, ILOAD_0};

    let mut enhancer = ClassEnhancer::new(ClassFile::new(49, "Loop", Some("java/lang/Object"))?);

    enhancer.add_method("run", "()I", MethodAccessFlags::STATIC, |code| {
        code.push_int(0)?.store(&int(), 0);
        let back = (2i16 - 8).to_be_bytes();
        code.raw(&[IINC, 0, 1, ILOAD_0, BIPUSH, 10, IF_ICMPLT, back[0], back[1]], 0, 2);
        code.load(&int(), 0).return_value(&int());
        Ok(())
    })?;

    enhancer.add_method(
        "main",
        "([Ljava/lang/String;)V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        |code| {
            code.invoke_static("Loop", "run", &method("()I"))?;
            println_int(code)?;
            code.return_value(&void());
            Ok(())
        },
    )?;

    Ok(enhancer.into_class())
}

pub fn write_class(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
    let path = dir.join(format!("{name}.class"));
    fs::write(&path, bytes)?;
    Ok(path)
}
