//! De-identification: profile options, the layered option merge, the
//! built-in rule table and date offsets.

mod offset;
mod options;
mod policy;

pub use offset::{shift_date, DateOffset};
pub use options::{
    DeidLayer, DeidOption, LongitudinalMode, PartialPs315Options, PrivateMode, Ps315Options,
    RetainList, UidMode,
};
pub use policy::{derived_uid, Action, BasicProfile, DeidPolicy};
