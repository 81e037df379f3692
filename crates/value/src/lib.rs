//! Column values and typed tuples for the catalog layer.
//!
//! Everything that crosses the on-disk boundary goes through this crate:
//! fixed-width big-endian integers via [`mach`], column types via
//! [`DataType`], and catalog rows via [`Tuple`].

pub mod mach;
mod tuple;
mod types;
mod value;

pub use tuple::{
    Tuple,
    TupleField,
};
pub use types::{
    DataType,
    MainType,
    PreciseType,
};
pub use value::{
    DataValue,
    UNIV_SQL_NULL,
};
