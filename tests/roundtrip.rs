mod util;

use bytes::Bytes;
use classfile::attributes::Attribute;
use classfile::flags::FieldAccessFlags;
use classfile::{ClassFile, ClassFileError, Result, StructuralEq};
use enhancer::ClassEnhancer;
use util::{compile, counter, init_logging, javac_available, scratch};

const CUSTOM: &str = "org.example.Custom";

#[test]
fn it_round_trips_built_classes() -> Result<()> {
    init_logging();
    let bytes = counter()?.write();

    let class = ClassFile::read(&bytes)?;
    assert_eq!(class.write(), bytes);
    assert!(class.structurally_eq(&ClassFile::read(&class.write())?));
    Ok(())
}

#[test]
fn it_rejects_every_truncation() -> Result<()> {
    let bytes = counter()?.write();

    for len in 0..bytes.len() {
        assert!(ClassFile::read(&bytes[..len]).is_err(), "{len} of {} bytes", bytes.len());
    }

    assert!(matches!(
        ClassFile::read(&bytes[..9]),
        Err(ClassFileError::TruncatedInput(_))
    ));
    Ok(())
}

#[test]
fn it_preserves_unknown_attributes() -> Result<()> {
    init_logging();
    let payload = Bytes::from_static(&[0xCA, 0xFE, 0x00, 0x01, 0xFF]);

    let mut class = counter()?;
    let attribute = Attribute::raw(&mut class.constant_pool, CUSTOM, payload.clone())?;
    class.attributes.push(attribute);

    // Read it back, change something unrelated, and write it again
    let mut enhancer = ClassEnhancer::read(&class.write())?;
    enhancer.add_field("unrelated", "J", FieldAccessFlags::PRIVATE)?;
    let rewritten = ClassFile::read(&enhancer.write())?;

    let custom = rewritten
        .attributes
        .find(&rewritten.constant_pool, CUSTOM)
        .expect("custom attribute survives");
    assert_eq!(custom.info.as_raw(), Some(&payload));

    // The raw bytes sit in the output exactly as they were written
    let output = enhancer.write();
    assert!(output.windows(payload.len()).any(|w| w == &payload[..]));
    Ok(())
}

#[test]
fn it_compares_structurally() -> Result<()> {
    let bytes = counter()?.write();

    let mutate = |bytes: &[u8]| -> Result<ClassFile> {
        let mut enhancer = ClassEnhancer::read(bytes)?;
        enhancer.add_interface("java/io/Serializable")?;
        enhancer.add_field("x$rc", "I", FieldAccessFlags::PRIVATE)?;
        Ok(enhancer.into_class())
    };

    let left = mutate(&bytes)?;
    let right = mutate(&bytes)?;
    assert!(left.structurally_eq(&left));
    assert!(left.structurally_eq(&right));

    let mut different = ClassEnhancer::read(&bytes)?;
    different.add_interface("java/io/Serializable")?;
    different.add_field("x$rc", "I", FieldAccessFlags::PUBLIC)?;

    let mismatch = left.structural_diff(different.class()).unwrap_err();
    assert_eq!(mismatch.path(), "fields[1].flags");
    Ok(())
}

#[test]
fn it_round_trips_compiled_classes() -> Result<()> {
    init_logging();
    if !javac_available() {
        return Ok(());
    }

    let dir = scratch("roundtrip").unwrap();
    let source = r#"
        import java.util.ArrayList;
        import java.util.List;
        import java.util.function.IntUnaryOperator;

        public class Shapes<T extends Comparable<T>> {
            static final long BIG = 1234567890123L;
            static final double RATIO = 0.5;
            static final float NAN = Float.NaN;
            static final String NAME = "shapes é\u0000";

            private final List<T> items = new ArrayList<>();

            @Deprecated
            public int classify(int value) {
                switch (value) {
                    case 0: return 10;
                    case 1: return 11;
                    case 2: return 12;
                    case 1000: return 13;
                    default: return -1;
                }
            }

            public long sparse(int value) {
                switch (value) {
                    case -50000: return BIG;
                    case 7: return 7;
                    case 90000: return 9;
                    default: return 0;
                }
            }

            public int guarded(String input) {
                try {
                    return Integer.parseInt(input);
                } catch (NumberFormatException e) {
                    return -1;
                } finally {
                    items.clear();
                }
            }

            public int apply(int seed) {
                IntUnaryOperator twice = x -> x * 2;
                return twice.applyAsInt(seed);
            }

            class Inner {
                int size() { return items.size(); }
            }
        }
    "#;

    let path = compile(&dir, "Shapes", source).unwrap();
    let bytes = std::fs::read(path).unwrap();

    let class = ClassFile::read(&bytes)?;
    assert_eq!(class.write(), bytes);
    assert!(class.dump().contains("classify(I)I"));

    let inner = std::fs::read(dir.join("Shapes$Inner.class")).unwrap();
    assert_eq!(ClassFile::read(&inner)?.write(), inner);
    Ok(())
}
