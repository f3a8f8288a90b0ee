use std::cmp::Ordering;
use std::ffi::{OsStr, OsString};

use crate::error::{Error, Result};

/// One step of the merge-join over two sorted entry lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    /// Only in the first list.
    Left(&'a OsStr),
    /// Only in the second list.
    Right(&'a OsStr),
    /// In both lists.
    Both(&'a OsStr),
}

/// Merge-join of two lists that must be strictly ascending.
///
/// An out of order or duplicated name yields `Error::Logic` and ends the
/// iteration.
pub struct Merge<'a> {
    left: &'a [OsString],
    right: &'a [OsString],
    pos1: usize,
    pos2: usize,
    failed: bool,
}

impl<'a> Merge<'a> {
    pub fn new(left: &'a [OsString], right: &'a [OsString]) -> Self {
        Merge {
            left,
            right,
            pos1: 0,
            pos2: 0,
            failed: false,
        }
    }

    fn check_order(list: &[OsString], pos: usize) -> Result<()> {
        if pos > 0 && list[pos - 1] >= list[pos] {
            return Err(Error::Logic(format!(
                "entries not strictly ascending: {:?} before {:?}",
                list[pos - 1],
                list[pos]
            )));
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Step<'a>>> {
        let left = self.left;
        let right = self.right;

        let step = match (left.get(self.pos1), right.get(self.pos2)) {
            (None, None) => return Ok(None),
            (Some(name1), None) => {
                Self::check_order(left, self.pos1)?;
                self.pos1 += 1;
                Step::Left(name1)
            }
            (None, Some(name2)) => {
                Self::check_order(right, self.pos2)?;
                self.pos2 += 1;
                Step::Right(name2)
            }
            (Some(name1), Some(name2)) => {
                Self::check_order(left, self.pos1)?;
                Self::check_order(right, self.pos2)?;
                match name1.cmp(name2) {
                    Ordering::Less => {
                        self.pos1 += 1;
                        Step::Left(name1)
                    }
                    Ordering::Greater => {
                        self.pos2 += 1;
                        Step::Right(name2)
                    }
                    Ordering::Equal => {
                        if name1.as_encoded_bytes() != name2.as_encoded_bytes() {
                            return Err(Error::Logic(format!(
                                "names at the same position differ: {name1:?} and {name2:?}"
                            )));
                        }
                        self.pos1 += 1;
                        self.pos2 += 1;
                        Step::Both(name1)
                    }
                }
            }
        };

        Ok(Some(step))
    }
}

impl<'a> Iterator for Merge<'a> {
    type Item = Result<Step<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(step) => step.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn interleaves_in_order() {
        let left = names(&["a", "b", "c"]);
        let right = names(&["a", "c", "d"]);

        let steps: Vec<_> = Merge::new(&left, &right).collect::<Result<_>>().unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Both(OsStr::new("a")),
                Step::Left(OsStr::new("b")),
                Step::Both(OsStr::new("c")),
                Step::Right(OsStr::new("d")),
            ]
        );
    }

    #[test]
    fn handles_empty_sides() {
        let empty = names(&[]);
        let some = names(&["x", "y"]);

        assert_eq!(Merge::new(&empty, &empty).count(), 0);
        let steps: Vec<_> = Merge::new(&empty, &some).collect::<Result<_>>().unwrap();
        assert_eq!(steps, vec![Step::Right(OsStr::new("x")), Step::Right(OsStr::new("y"))]);
    }

    #[test]
    fn byte_order_not_locale_order() {
        let left = names(&["B", "a"]);
        let right = names(&["a"]);

        let steps: Vec<_> = Merge::new(&left, &right).collect::<Result<_>>().unwrap();
        assert_eq!(steps, vec![Step::Left(OsStr::new("B")), Step::Both(OsStr::new("a"))]);
    }

    #[test]
    fn unsorted_input_is_fatal() {
        let left = names(&["a", "c", "b"]);
        let right = names(&["b"]);

        let results: Vec<_> = Merge::new(&left, &right).collect();
        assert!(matches!(results.last(), Some(Err(Error::Logic(_)))));
        // nothing after the failure
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[test]
    fn duplicates_are_fatal() {
        let left = names(&["a", "a"]);
        let right = names(&["a", "a"]);

        let results: Vec<_> = Merge::new(&left, &right).collect();
        assert!(matches!(results[0], Ok(Step::Both(_))));
        assert!(matches!(results[1], Err(Error::Logic(_))));
    }
}
