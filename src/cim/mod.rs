//! The CIM data model: typed values, paths, instances, classes and
//! qualifiers, independent of any wire encoding.

pub mod datetime;
pub mod namemap;
pub mod object;
pub mod path;
pub mod qualifier;
pub mod types;
pub mod value;

pub use datetime::{CimDateTime, CimInterval, CimTimestamp};
pub use namemap::NameMap;
pub use object::{
    CimClass, CimInstance, CimMethod, CimObject, CimParameter, CimProperty, EmbeddedObjectKind,
};
pub use path::CimObjectPath;
pub use qualifier::{CimQualifier, CimQualifierDeclaration, QualifierScopes};
pub use types::CimType;
pub use value::{CimArray, CimValue};
