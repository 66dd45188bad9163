//! The FIPA-ACL-style performative tag carried by every message.

use std::fmt;

/// A message's performative: the intent behind sending it.
///
/// `None` is the absence-of-performative sentinel and is omitted from
/// the wire entirely rather than encoded as a string (see
/// [`Performative::is_none`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Performative {
    #[default]
    None = 0,
    Request = 1,
    Agree = 2,
    Refuse = 3,
    Failure = 4,
    Inform = 5,
    Confirm = 6,
    Disconfirm = 7,
    QueryIf = 8,
    NotUnderstood = 9,
    Cfp = 10,
    Propose = 11,
    Cancel = 12,
}

impl Performative {
    /// Whether this is the absence-of-performative sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// The exact-case wire string, or `None` for [`Performative::None`]
    /// (which is never written to the wire).
    #[must_use]
    pub const fn as_wire_str(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Request => Some("REQUEST"),
            Self::Agree => Some("AGREE"),
            Self::Refuse => Some("REFUSE"),
            Self::Failure => Some("FAILURE"),
            Self::Inform => Some("INFORM"),
            Self::Confirm => Some("CONFIRM"),
            Self::Disconfirm => Some("DISCONFIRM"),
            Self::QueryIf => Some("QUERY_IF"),
            Self::NotUnderstood => Some("NOT_UNDERSTOOD"),
            Self::Cfp => Some("CFP"),
            Self::Propose => Some("PROPOSE"),
            Self::Cancel => Some("CANCEL"),
        }
    }

    /// Parse the exact-case wire string produced by [`Performative::as_wire_str`].
    #[must_use]
    pub fn from_wire_str(s: &str) -> Option<Self> {
        Some(match s {
            "REQUEST" => Self::Request,
            "AGREE" => Self::Agree,
            "REFUSE" => Self::Refuse,
            "FAILURE" => Self::Failure,
            "INFORM" => Self::Inform,
            "CONFIRM" => Self::Confirm,
            "DISCONFIRM" => Self::Disconfirm,
            "QUERY_IF" => Self::QueryIf,
            "NOT_UNDERSTOOD" => Self::NotUnderstood,
            "CFP" => Self::Cfp,
            "PROPOSE" => Self::Propose,
            "CANCEL" => Self::Cancel,
            _ => return None,
        })
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str().unwrap_or("NONE"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_has_no_wire_string() {
        assert_eq!(Performative::None.as_wire_str(), None);
        assert!(Performative::None.is_none());
    }

    #[test]
    fn round_trips_every_non_none_variant() {
        let all = [
            Performative::Request,
            Performative::Agree,
            Performative::Refuse,
            Performative::Failure,
            Performative::Inform,
            Performative::Confirm,
            Performative::Disconfirm,
            Performative::QueryIf,
            Performative::NotUnderstood,
            Performative::Cfp,
            Performative::Propose,
            Performative::Cancel,
        ];
        for perf in all {
            let s = perf.as_wire_str().expect("non-none variant has a wire string");
            assert_eq!(Performative::from_wire_str(s), Some(perf));
        }
    }

    #[test]
    fn unknown_string_is_none() {
        assert_eq!(Performative::from_wire_str("BOGUS"), None);
    }

    #[test]
    fn numeric_codes_match_spec_order() {
        assert_eq!(Performative::None as u8, 0);
        assert_eq!(Performative::Request as u8, 1);
        assert_eq!(Performative::Cancel as u8, 12);
    }
}
