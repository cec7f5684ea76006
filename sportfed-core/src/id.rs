use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

macro_rules! id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy,
            Clone,
            Debug,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
        )]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl Display for $name {
            #[inline]
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl AsRef<u64> for $name {
            #[inline]
            fn as_ref(&self) -> &u64 {
                &self.0
            }
        }

        impl PartialEq<u64> for $name {
            #[inline]
            fn eq(&self, other: &u64) -> bool {
                self.0 == *other
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = <u64 as FromStr>::Err;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse::<u64>()?))
            }
        }
    };
}

id! {
    /// The identifier of a competition category owning at most one bracket.
    /// The category itself lives in the competition subsystem; the engine
    /// treats it as an opaque foreign key.
    CategoryId
}

id! {
    /// The identifier of a generated bracket.
    BracketId
}

id! {
    /// The identifier of a single match within a bracket.
    MatchId
}

id! {
    /// The identifier of an approved, eligible entrant. The entity behind it
    /// is owned by the registration subsystem.
    ParticipantId
}
