use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// How one path differs between the two roots.
    ///
    /// The bit values are stable and may be persisted.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Status: u32 {
        const CREATED     = 1 << 0;
        const DELETED     = 1 << 1;
        const TYPE        = 1 << 2;
        const CONTENT     = 1 << 3;
        const PERMISSIONS = 1 << 4;
        const USER        = 1 << 5;
        const GROUP       = 1 << 6;
    }
}

impl Status {
    /// Status as seen when comparing the roots the other way round.
    pub fn invert(self) -> Self {
        let mut ret = self;
        ret.set(Status::CREATED, self.contains(Status::DELETED));
        ret.set(Status::DELETED, self.contains(Status::CREATED));
        ret
    }
}

/// Renders the five column form, e.g. `c.u..` or `+....`.
impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = if self.contains(Status::CREATED) {
            '+'
        } else if self.contains(Status::DELETED) {
            '-'
        } else if self.contains(Status::TYPE) {
            't'
        } else if self.contains(Status::CONTENT) {
            'c'
        } else {
            '.'
        };

        let flag = |bit: Status, c: char| if self.contains(bit) { c } else { '.' };

        write!(
            f,
            "{first}{}{}{}.",
            flag(Status::PERMISSIONS, 'p'),
            flag(Status::USER, 'u'),
            flag(Status::GROUP, 'g'),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status string {0:?}")]
pub struct ParseStatusError(String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ret = Status::empty();
        let mut chars = s.chars();

        match chars.next() {
            Some('+') => ret |= Status::CREATED,
            Some('-') => ret |= Status::DELETED,
            Some('t') => ret |= Status::TYPE,
            Some('c') => ret |= Status::CONTENT,
            Some('.') => {}
            _ => return Err(ParseStatusError(s.to_string())),
        }

        for (expected, bit) in [('p', Status::PERMISSIONS), ('u', Status::USER), ('g', Status::GROUP)] {
            match chars.next() {
                Some(c) if c == expected => ret |= bit,
                Some('.') => {}
                _ => return Err(ParseStatusError(s.to_string())),
            }
        }

        // trailing reserved column is optional
        match chars.next() {
            None | Some('.') => {}
            Some(_) => return Err(ParseStatusError(s.to_string())),
        }
        if chars.next().is_some() {
            return Err(ParseStatusError(s.to_string()));
        }

        Ok(ret)
    }
}
