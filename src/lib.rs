//! A WBEM client: typed CIM operations over the CIM-XML protocol.
//!
//! This crate speaks the DSP0200/DSP0201 wire protocol to a CIM Object
//! Manager: it builds CIM-XML request documents from typed CIM values and
//! objects, posts them over HTTP(S), and reduces the XML responses back
//! into instances, classes, paths and qualifier declarations.
//!
//! ```rust,no_run
//! use wbem::{Credentials, EnumerateInstancesOptions, WbemConnection};
//!
//! fn main() -> wbem::Result<()> {
//!     let mut conn = WbemConnection::connect("https://cimom.example.com:5989/cimom")
//!         .with_credentials(Credentials::new("admin", "secret"))
//!         .with_default_namespace("root/cimv2");
//!
//!     let instances = conn.enumerate_instances(
//!         "CIM_ComputerSystem",
//!         None,
//!         &EnumerateInstancesOptions::default(),
//!     )?;
//!     for instance in instances {
//!         println!("{}", instance.path().unwrap());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Large result sets are better consumed through the `iter_*` family,
//! which uses the paged Open/Pull protocol when the server supports it and
//! transparently falls back to the one-shot operations when it does not:
//!
//! ```rust,no_run
//! # use wbem::{EnumerateInstancesOptions, OpenOptions, WbemConnection};
//! # fn main() -> wbem::Result<()> {
//! # let mut conn = WbemConnection::connect("https://cimom.example.com:5989/cimom");
//! let open = OpenOptions {
//!     max_object_count: 100,
//!     ..Default::default()
//! };
//! for instance in conn.iter_enumerate_instances(
//!     "CIM_LogicalDisk",
//!     None,
//!     &EnumerateInstancesOptions::default(),
//!     &open,
//! )? {
//!     let instance = instance?;
//!     println!("{}", instance.classname());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cim;
pub mod cimxml;
pub mod connection;
pub mod err;
pub mod pull;
pub mod recorder;
pub mod transport;

pub use cim::{
    CimArray, CimClass, CimDateTime, CimInstance, CimInterval, CimMethod, CimObject,
    CimObjectPath, CimParameter, CimProperty, CimQualifier, CimQualifierDeclaration,
    CimTimestamp, CimType, CimValue, EmbeddedObjectKind, NameMap, QualifierScopes,
};
pub use connection::{
    AssociatorOptions, DEFAULT_NAMESPACE, EnumerateClassesOptions, EnumerateInstancesOptions,
    EnumerationContext, GetClassOptions, GetInstanceOptions, LastOperation, ObjectName,
    OpenOptions, PropertyList, PullMode, PulledInstances, PulledPaths, QueryOpenResult,
    ReferenceOptions, WbemConnection,
};
pub use err::{
    BuildError, CimError, CimStatusCode, ParameterError, ProtocolError, Result, TransportError,
    ValueError, WbemError, XmlError,
};
pub use pull::{InstanceIter, PathIter, QueryResult};
pub use recorder::{LogRecorder, OperationRecorder};
pub use transport::{Credentials, TransportReply, TransportRequest, WbemTransport};

#[cfg(feature = "http")]
pub use transport::UreqTransport;
