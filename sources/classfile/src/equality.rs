//! Deep structural comparison of class file structures.
//!
//! Comparison is used to verify round trips and mutation sequences. Instead of a
//! boolean it reports the first mismatch together with the path of the structure
//! that differs, e.g. `methods[1].attributes[0].Code.exception_table.handlers[0].end_pc`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    path: Vec<String>,
    pub left: String,
    pub right: String,
}

impl Mismatch {
    pub fn new(left: impl fmt::Debug, right: impl fmt::Debug) -> Self {
        Self {
            path: vec![],
            left: format!("{left:?}"),
            right: format!("{right:?}"),
        }
    }

    /// Prefix the path with the name of the enclosing structure or field.
    pub fn within(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    pub fn path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} != {}", self.path(), self.left, self.right)
    }
}

impl std::error::Error for Mismatch {}

pub trait StructuralEq {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch>;

    fn structurally_eq(&self, other: &Self) -> bool {
        self.structural_diff(other).is_ok()
    }
}

/// Compare a leaf value.
pub(crate) fn compare<T>(field: &str, left: &T, right: &T) -> Result<(), Mismatch>
where
    T: PartialEq + fmt::Debug,
{
    if left == right {
        Ok(())
    } else {
        Err(Mismatch::new(left, right).within(field))
    }
}

/// Compare two sequences element by element, in order.
pub(crate) fn compare_seq<T>(field: &str, left: &[T], right: &[T]) -> Result<(), Mismatch>
where
    T: StructuralEq,
{
    if left.len() != right.len() {
        return Err(Mismatch::new(left.len(), right.len())
            .within("len()")
            .within(field));
    }

    for (i, (l, r)) in left.iter().zip(right).enumerate() {
        l.structural_diff(r)
            .map_err(|m| m.within(format!("[{i}]")).within(field))?;
    }

    Ok(())
}
