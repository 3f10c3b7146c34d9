use std::time::Duration;

use log::{debug, trace};

use crate::cim::{
    CimClass, CimInstance, CimObject, CimObjectPath, CimQualifierDeclaration, CimValue, NameMap,
};
use crate::cimxml::request::{self, OpParam};
use crate::cimxml::tupleparse::{self, IMethodResponse, ParamValue, RspError};
use crate::cimxml::tupletree::TupleTree;
use crate::err::{BuildError, ParameterError, ProtocolError, Result, WbemError};
use crate::recorder::OperationRecorder;
use crate::transport::{Credentials, TransportRequest, WbemTransport};

/// The namespace used when neither the caller nor a target path names one.
pub const DEFAULT_NAMESPACE: &str = "root/cimv2";

/// Connection-level pull policy: probe and fall back, always pull, or
/// never pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullMode {
    /// Try the pull operation first; on `CIM_ERR_NOT_SUPPORTED` fall back
    /// to the traditional operation and remember the answer.
    #[default]
    Auto,
    /// Always use pull operations; "not supported" propagates.
    Force,
    /// Always use traditional operations; no probe is ever sent.
    Never,
}

/// What a connection has learned about one pull operation family.
///
/// Moves from `Unknown` to exactly one of the terminal states the first
/// time a probe succeeds or is rejected with "not supported"; never moves
/// back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PullCapability {
    #[default]
    Unknown,
    Supported,
    Unsupported,
}

/// The operation families with distinct pull/traditional pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PullFamily {
    EnumInstances = 0,
    EnumPaths = 1,
    AssocInstances = 2,
    AssocPaths = 3,
    RefInstances = 4,
    RefPaths = 5,
    Query = 6,
}

#[derive(Debug, Default)]
pub(crate) struct PullCaps([PullCapability; 7]);

impl PullCaps {
    pub(crate) fn get(&self, family: PullFamily) -> PullCapability {
        self.0[family as usize]
    }

    /// Commit a terminal state; once terminal, later writes are ignored.
    pub(crate) fn commit(&mut self, family: PullFamily, cap: PullCapability) {
        let slot = &mut self.0[family as usize];
        if *slot == PullCapability::Unknown && cap != PullCapability::Unknown {
            debug!("pull capability for {family:?} resolved to {cap:?}");
            *slot = cap;
        }
    }
}

/// A property-name filter. A single bare name is accepted and behaves as a
/// one-element list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyList(Vec<String>);

impl PropertyList {
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for PropertyList {
    fn from(name: &str) -> Self {
        PropertyList(vec![name.to_owned()])
    }
}

impl From<String> for PropertyList {
    fn from(name: String) -> Self {
        PropertyList(vec![name])
    }
}

impl From<Vec<String>> for PropertyList {
    fn from(names: Vec<String>) -> Self {
        PropertyList(names)
    }
}

impl From<&[&str]> for PropertyList {
    fn from(names: &[&str]) -> Self {
        PropertyList(names.iter().map(|s| (*s).to_owned()).collect())
    }
}

/// The polymorphic target of an association or method operation, resolved
/// once at the connection boundary: a class (by name, optionally with a
/// namespace) or an instance (by path).
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectName {
    Class {
        name: String,
        namespace: Option<String>,
    },
    Instance(CimObjectPath),
}

impl ObjectName {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            ObjectName::Class { namespace, .. } => namespace.as_deref(),
            ObjectName::Instance(path) => path.namespace(),
        }
    }

    fn to_param(&self) -> OpParam {
        match self {
            ObjectName::Class { name, .. } => OpParam::ClassName(name.clone()),
            ObjectName::Instance(path) => OpParam::InstanceName(path.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            ObjectName::Class { name, .. } => name.clone(),
            ObjectName::Instance(path) => path.to_string(),
        }
    }
}

impl From<&str> for ObjectName {
    fn from(name: &str) -> Self {
        ObjectName::Class {
            name: name.to_owned(),
            namespace: None,
        }
    }
}

impl From<String> for ObjectName {
    fn from(name: String) -> Self {
        ObjectName::Class {
            name,
            namespace: None,
        }
    }
}

impl From<CimObjectPath> for ObjectName {
    fn from(path: CimObjectPath) -> Self {
        if path.is_instance_path() {
            ObjectName::Instance(path)
        } else {
            ObjectName::Class {
                name: path.classname().to_owned(),
                namespace: path.namespace().map(str::to_owned),
            }
        }
    }
}

impl From<&CimObjectPath> for ObjectName {
    fn from(path: &CimObjectPath) -> Self {
        ObjectName::from(path.clone())
    }
}

/// Options for EnumerateInstances and OpenEnumerateInstances.
#[derive(Debug, Clone, Default)]
pub struct EnumerateInstancesOptions {
    pub local_only: Option<bool>,
    pub deep_inheritance: Option<bool>,
    pub include_qualifiers: Option<bool>,
    pub include_class_origin: Option<bool>,
    pub property_list: Option<PropertyList>,
}

/// Options for GetInstance.
#[derive(Debug, Clone, Default)]
pub struct GetInstanceOptions {
    pub local_only: Option<bool>,
    pub include_qualifiers: Option<bool>,
    pub include_class_origin: Option<bool>,
    pub property_list: Option<PropertyList>,
}

/// Options for the Associators/AssociatorNames family.
#[derive(Debug, Clone, Default)]
pub struct AssociatorOptions {
    pub assoc_class: Option<String>,
    pub result_class: Option<String>,
    pub role: Option<String>,
    pub result_role: Option<String>,
    pub include_qualifiers: Option<bool>,
    pub include_class_origin: Option<bool>,
    pub property_list: Option<PropertyList>,
}

/// Options for the References/ReferenceNames family.
#[derive(Debug, Clone, Default)]
pub struct ReferenceOptions {
    pub result_class: Option<String>,
    pub role: Option<String>,
    pub include_qualifiers: Option<bool>,
    pub include_class_origin: Option<bool>,
    pub property_list: Option<PropertyList>,
}

/// Options for GetClass.
#[derive(Debug, Clone, Default)]
pub struct GetClassOptions {
    pub local_only: Option<bool>,
    pub include_qualifiers: Option<bool>,
    pub include_class_origin: Option<bool>,
    pub property_list: Option<PropertyList>,
}

/// Options for EnumerateClasses / EnumerateClassNames.
#[derive(Debug, Clone, Default)]
pub struct EnumerateClassesOptions {
    pub deep_inheritance: Option<bool>,
    pub local_only: Option<bool>,
    pub include_qualifiers: Option<bool>,
    pub include_class_origin: Option<bool>,
}

/// Options common to every Open* operation.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub filter_query_language: Option<String>,
    pub filter_query: Option<String>,
    /// Requested server-side session keepalive, in seconds.
    pub operation_timeout: Option<u32>,
    pub continue_on_error: Option<bool>,
    /// Objects to return in the open response itself; 0 opens the session
    /// without returning any.
    pub max_object_count: u32,
}

/// An open server-side enumeration session: the server-issued token plus
/// the namespace it was opened against. Becomes invalid once the sequence
/// ends or the session is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationContext {
    context: String,
    namespace: String,
}

impl EnumerationContext {
    pub(crate) fn new(context: String, namespace: String) -> Self {
        EnumerationContext { context, namespace }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// One page of pulled instances. `context` is `None` exactly when the
/// sequence is complete.
#[derive(Debug)]
pub struct PulledInstances {
    pub instances: Vec<CimInstance>,
    pub context: Option<EnumerationContext>,
}

/// One page of pulled instance paths.
#[derive(Debug)]
pub struct PulledPaths {
    pub paths: Vec<CimObjectPath>,
    pub context: Option<EnumerationContext>,
}

/// The result of OpenQueryInstances: the first page, the optional query
/// result class, and the continuation context.
#[derive(Debug)]
pub struct QueryOpenResult {
    pub instances: Vec<CimInstance>,
    pub query_result_class: Option<CimClass>,
    pub context: Option<EnumerationContext>,
}

/// Diagnostic state of the most recent round trip.
#[derive(Debug, Default)]
pub struct LastOperation {
    pub raw_request: Option<String>,
    pub raw_reply: Option<String>,
    pub request_len: usize,
    pub reply_len: usize,
    pub duration: Option<Duration>,
}

/// A synchronous client connection to one CIMOM.
///
/// One request is in flight at a time; every operation blocks until the
/// round trip and response reduction complete.
pub struct WbemConnection<T: WbemTransport> {
    transport: T,
    url: String,
    default_namespace: String,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
    pull_mode: PullMode,
    pub(crate) pull_caps: PullCaps,
    recorders: Vec<Box<dyn OperationRecorder>>,
    last: LastOperation,
}

impl<T: WbemTransport> WbemConnection<T> {
    pub fn with_transport(transport: T, url: impl Into<String>) -> Self {
        WbemConnection {
            transport,
            url: url.into(),
            default_namespace: DEFAULT_NAMESPACE.to_owned(),
            credentials: None,
            timeout: None,
            pull_mode: PullMode::Auto,
            pull_caps: PullCaps::default(),
            recorders: Vec::new(),
            last: LastOperation::default(),
        }
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into().trim_matches('/').to_owned();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_pull_mode(mut self, mode: PullMode) -> Self {
        self.pull_mode = mode;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn pull_mode(&self) -> PullMode {
        self.pull_mode
    }

    /// Whether this connection has established that the server supports
    /// the pull operations of the instance-enumeration family. `None`
    /// until the first probe resolves it.
    pub fn pull_enumeration_supported(&self) -> Option<bool> {
        match self.pull_caps.get(PullFamily::EnumInstances) {
            PullCapability::Unknown => None,
            PullCapability::Supported => Some(true),
            PullCapability::Unsupported => Some(false),
        }
    }

    /// Register an operation recorder; recorders see every call attempt.
    pub fn add_recorder(&mut self, recorder: Box<dyn OperationRecorder>) {
        self.recorders.push(recorder);
    }

    /// Diagnostic state of the most recent round trip.
    pub fn last_operation(&self) -> &LastOperation {
        &self.last
    }

    /// Namespace priority: explicit argument, then a target-carried
    /// namespace, then the connection default.
    fn resolve_namespace(&self, explicit: Option<&str>, from_target: Option<&str>) -> String {
        explicit
            .or(from_target)
            .map(|ns| ns.trim_matches('/'))
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.default_namespace)
            .to_owned()
    }

    pub(crate) fn enrich_protocol(&self, source: ProtocolError) -> WbemError {
        WbemError::Protocol {
            source,
            request: self.last.raw_request.clone().map(String::into_boxed_str),
            reply: self.last.raw_reply.clone().map(String::into_boxed_str),
        }
    }

    /// One intrinsic round trip: build, send, parse, reduce, enrich.
    fn imethodcall(
        &mut self,
        operation: &'static str,
        namespace: &str,
        params: Vec<(&'static str, OpParam)>,
    ) -> Result<IMethodResponse> {
        let body = request::build_imethodcall(operation, namespace, &params)?;
        let request_text = String::from_utf8(body).map_err(|e| {
            WbemError::Build(BuildError::Write {
                message: e.to_string(),
            })
        })?;
        let reply_body = self.round_trip(operation, namespace, request_text)?;

        let tree = TupleTree::parse(&reply_body).map_err(|source| WbemError::MalformedXml {
            source,
            request: self.last.raw_request.clone().map(String::into_boxed_str),
            reply: self.last.raw_reply.clone().map(String::into_boxed_str),
        })?;
        match tupleparse::reduce_imethod_response(tree, operation) {
            Ok(rsp) => Ok(rsp),
            Err(RspError::Protocol(source)) => Err(self.enrich_protocol(source)),
            Err(RspError::Cim(source)) => Err(WbemError::Cim {
                source,
                request: self.last.raw_request.clone().map(String::into_boxed_str),
                reply: self.last.raw_reply.clone().map(String::into_boxed_str),
            }),
        }
    }

    /// Send one request, updating the diagnostic state as the reply comes
    /// back. Returns the raw reply bytes.
    fn round_trip(
        &mut self,
        method_name: &str,
        cim_object: &str,
        request_text: String,
    ) -> Result<Vec<u8>> {
        self.last = LastOperation {
            request_len: request_text.len(),
            ..LastOperation::default()
        };
        trace!("{method_name}: {} byte request", request_text.len());

        let transport_request = TransportRequest {
            url: &self.url,
            method_name,
            cim_object,
            body: request_text.as_bytes(),
            credentials: self.credentials.as_ref(),
            timeout: self.timeout,
        };
        let reply = match self.transport.send(&transport_request) {
            Ok(reply) => reply,
            Err(source) => {
                self.last.raw_request = Some(request_text.clone());
                return Err(WbemError::Transport {
                    source,
                    request: Some(request_text.into_boxed_str()),
                });
            }
        };
        self.last.raw_request = Some(request_text);
        self.last.reply_len = reply.body.len();
        self.last.duration = Some(reply.elapsed);
        // Stored lossily so diagnostics survive even a non-UTF-8 reply.
        self.last.raw_reply = Some(String::from_utf8_lossy(&reply.body).into_owned());
        Ok(reply.body)
    }

    /// Run `f` with the recorder protocol around it: reset, stage the
    /// call, stage the result or error, record, on every path.
    fn recorded<R: std::fmt::Debug>(
        &mut self,
        method: &'static str,
        args: Vec<(&'static str, String)>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        for recorder in &mut self.recorders {
            recorder.reset();
            recorder.stage_call(method, &args);
        }
        let result = f(self);
        match &result {
            Ok(value) => {
                let rendered = format!("{value:?}");
                for recorder in &mut self.recorders {
                    recorder.stage_result(Some(&rendered), None);
                }
            }
            Err(error) => {
                let rendered = error.to_string();
                for recorder in &mut self.recorders {
                    recorder.stage_result(None, Some(&rendered));
                }
            }
        }
        for recorder in &mut self.recorders {
            recorder.record_staged();
        }
        result
    }

    // Response-shape checks, per operation declaration.

    fn expect_void(&self, operation: &'static str, rsp: IMethodResponse) -> Result<()> {
        if rsp.return_children.is_some() {
            return Err(self.enrich_protocol(ProtocolError::UnexpectedOutput {
                operation,
                kind: "IRETURNVALUE",
            }));
        }
        if !rsp.out_params.is_empty() {
            return Err(self.enrich_protocol(ProtocolError::UnexpectedOutput {
                operation,
                kind: "PARAMVALUE",
            }));
        }
        Ok(())
    }

    /// The missing-IRETURNVALUE tolerance: absent means empty.
    fn list_return(&self, operation: &'static str, rsp: IMethodResponse) -> Result<Vec<TupleTree>> {
        if !rsp.out_params.is_empty() {
            return Err(self.enrich_protocol(ProtocolError::UnexpectedOutput {
                operation,
                kind: "PARAMVALUE",
            }));
        }
        Ok(rsp.return_children.unwrap_or_default())
    }

    fn single_return(&self, operation: &'static str, rsp: IMethodResponse) -> Result<TupleTree> {
        let mut children = self.list_return(operation, rsp)?;
        match children.len() {
            1 => Ok(children.remove(0)),
            0 => Err(self.enrich_protocol(ProtocolError::MissingElement {
                expected: "a return element",
                context: "IRETURNVALUE",
            })),
            _ => Err(self.enrich_protocol(ProtocolError::UnexpectedElement {
                expected: "a single return element",
                found: children[1].name.clone(),
                context: "IRETURNVALUE",
            })),
        }
    }

    fn stamp_instance_namespace(&self, instances: &mut [CimInstance], namespace: &str) {
        for instance in instances {
            if let Some(path) = instance.path_mut() {
                path.set_namespace(Some(namespace.to_owned()));
                path.set_host(None);
            }
        }
    }

    fn stamp_path_namespace(&self, paths: &mut [CimObjectPath], namespace: &str) {
        for path in paths {
            path.set_namespace(Some(namespace.to_owned()));
            path.set_host(None);
        }
    }

    // ------------------------------------------------------------------
    // Instance operations
    // ------------------------------------------------------------------

    /// Enumerate the instances of a class.
    ///
    /// Every returned instance carries a path stamped with the effective
    /// namespace of the call; the wire omits it for this operation.
    pub fn enumerate_instances(
        &mut self,
        classname: &str,
        namespace: Option<&str>,
        options: &EnumerateInstancesOptions,
    ) -> Result<Vec<CimInstance>> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("EnumerateInstances", args, |conn| {
            let mut params = vec![("ClassName", OpParam::ClassName(classname.to_owned()))];
            push_bool(&mut params, "LocalOnly", options.local_only);
            push_bool(&mut params, "DeepInheritance", options.deep_inheritance);
            push_bool(&mut params, "IncludeQualifiers", options.include_qualifiers);
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());

            let rsp = conn.imethodcall("EnumerateInstances", &ns, params)?;
            let children = conn.list_return("EnumerateInstances", rsp)?;
            let mut instances = tupleparse::named_instances(children)
                .map_err(|e| conn.enrich_protocol(e))?;
            conn.stamp_instance_namespace(&mut instances, &ns);
            Ok(instances)
        })
    }

    /// Enumerate the instance paths of a class; paths are stamped with the
    /// effective namespace.
    pub fn enumerate_instance_names(
        &mut self,
        classname: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<CimObjectPath>> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("EnumerateInstanceNames", args, |conn| {
            let params = vec![("ClassName", OpParam::ClassName(classname.to_owned()))];
            let rsp = conn.imethodcall("EnumerateInstanceNames", &ns, params)?;
            let children = conn.list_return("EnumerateInstanceNames", rsp)?;
            let mut paths =
                tupleparse::instance_names(children).map_err(|e| conn.enrich_protocol(e))?;
            conn.stamp_path_namespace(&mut paths, &ns);
            Ok(paths)
        })
    }

    /// Retrieve one instance. The result carries the request path completed
    /// with the effective namespace, since the response itself has none.
    pub fn get_instance(
        &mut self,
        path: &CimObjectPath,
        namespace: Option<&str>,
        options: &GetInstanceOptions,
    ) -> Result<CimInstance> {
        let ns = self.resolve_namespace(namespace, path.namespace());
        let args = vec![
            ("InstanceName", path.to_string()),
            ("namespace", ns.clone()),
        ];
        self.recorded("GetInstance", args, |conn| {
            let mut params = vec![("InstanceName", OpParam::InstanceName(path.clone()))];
            push_bool(&mut params, "LocalOnly", options.local_only);
            push_bool(&mut params, "IncludeQualifiers", options.include_qualifiers);
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());

            let rsp = conn.imethodcall("GetInstance", &ns, params)?;
            let child = conn.single_return("GetInstance", rsp)?;
            let mut instance =
                tupleparse::parse_instance(&child).map_err(|e| conn.enrich_protocol(e))?;

            let mut result_path = path.clone();
            result_path.set_namespace(Some(ns.clone()));
            result_path.set_host(None);
            instance.set_path(result_path).map_err(|_| {
                conn.enrich_protocol(ProtocolError::InvalidAttribute {
                    attribute: "CLASSNAME",
                    element: "INSTANCE",
                    value: instance.classname().to_owned(),
                    reason: "does not match the requested instance path".into(),
                })
            })?;
            Ok(instance)
        })
    }

    /// Create an instance; returns its server-assigned path stamped with
    /// the effective namespace.
    pub fn create_instance(
        &mut self,
        instance: &CimInstance,
        namespace: Option<&str>,
    ) -> Result<CimObjectPath> {
        let ns =
            self.resolve_namespace(namespace, instance.path().and_then(|p| p.namespace()));
        let args = vec![
            ("NewInstance", instance.classname().to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("CreateInstance", args, |conn| {
            let params = vec![("NewInstance", OpParam::Instance(instance.clone()))];
            let rsp = conn.imethodcall("CreateInstance", &ns, params)?;
            let child = conn.single_return("CreateInstance", rsp)?;
            let mut path =
                tupleparse::parse_instancename(&child).map_err(|e| conn.enrich_protocol(e))?;
            path.set_namespace(Some(ns.clone()));
            Ok(path)
        })
    }

    /// Modify an existing instance. The instance must carry a path.
    pub fn modify_instance(
        &mut self,
        instance: &CimInstance,
        include_qualifiers: Option<bool>,
        property_list: Option<&PropertyList>,
    ) -> Result<()> {
        let path = instance
            .path()
            .ok_or(ParameterError::MissingInstancePath {
                operation: "ModifyInstance",
            })?
            .clone();
        let ns = self.resolve_namespace(None, path.namespace());
        let args = vec![("ModifiedInstance", path.to_string())];
        self.recorded("ModifyInstance", args, |conn| {
            let mut params = vec![(
                "ModifiedInstance",
                OpParam::NamedInstance(instance.clone(), path.clone()),
            )];
            push_bool(&mut params, "IncludeQualifiers", include_qualifiers);
            push_property_list(&mut params, property_list);
            let rsp = conn.imethodcall("ModifyInstance", &ns, params)?;
            conn.expect_void("ModifyInstance", rsp)
        })
    }

    /// Delete one instance.
    pub fn delete_instance(
        &mut self,
        path: &CimObjectPath,
        namespace: Option<&str>,
    ) -> Result<()> {
        let ns = self.resolve_namespace(namespace, path.namespace());
        let args = vec![("InstanceName", path.to_string()), ("namespace", ns.clone())];
        self.recorded("DeleteInstance", args, |conn| {
            let params = vec![("InstanceName", OpParam::InstanceName(path.clone()))];
            let rsp = conn.imethodcall("DeleteInstance", &ns, params)?;
            conn.expect_void("DeleteInstance", rsp)
        })
    }

    // ------------------------------------------------------------------
    // Association operations
    // ------------------------------------------------------------------

    /// Retrieve the objects associated with a class or instance. Results
    /// carry the server-declared host and namespace; association results
    /// may legitimately span hosts, so nothing is defaulted locally.
    pub fn associators(
        &mut self,
        object_name: impl Into<ObjectName>,
        namespace: Option<&str>,
        options: &AssociatorOptions,
    ) -> Result<Vec<CimObject>> {
        let target = object_name.into();
        let ns = self.resolve_namespace(namespace, target.namespace());
        let args = vec![
            ("ObjectName", target.describe()),
            ("namespace", ns.clone()),
        ];
        self.recorded("Associators", args, |conn| {
            let mut params = vec![("ObjectName", target.to_param())];
            push_classname(&mut params, "AssocClass", options.assoc_class.as_deref());
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());
            push_string(&mut params, "ResultRole", options.result_role.as_deref());
            push_bool(&mut params, "IncludeQualifiers", options.include_qualifiers);
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());

            let rsp = conn.imethodcall("Associators", &ns, params)?;
            let children = conn.list_return("Associators", rsp)?;
            tupleparse::objects_with_path(children).map_err(|e| conn.enrich_protocol(e))
        })
    }

    /// Retrieve the paths of the objects associated with a class or
    /// instance.
    pub fn associator_names(
        &mut self,
        object_name: impl Into<ObjectName>,
        namespace: Option<&str>,
        options: &AssociatorOptions,
    ) -> Result<Vec<CimObjectPath>> {
        let target = object_name.into();
        let ns = self.resolve_namespace(namespace, target.namespace());
        let args = vec![
            ("ObjectName", target.describe()),
            ("namespace", ns.clone()),
        ];
        self.recorded("AssociatorNames", args, |conn| {
            let mut params = vec![("ObjectName", target.to_param())];
            push_classname(&mut params, "AssocClass", options.assoc_class.as_deref());
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());
            push_string(&mut params, "ResultRole", options.result_role.as_deref());

            let rsp = conn.imethodcall("AssociatorNames", &ns, params)?;
            let children = conn.list_return("AssociatorNames", rsp)?;
            tupleparse::object_paths(children).map_err(|e| conn.enrich_protocol(e))
        })
    }

    /// Retrieve the association objects referring to a class or instance.
    pub fn references(
        &mut self,
        object_name: impl Into<ObjectName>,
        namespace: Option<&str>,
        options: &ReferenceOptions,
    ) -> Result<Vec<CimObject>> {
        let target = object_name.into();
        let ns = self.resolve_namespace(namespace, target.namespace());
        let args = vec![
            ("ObjectName", target.describe()),
            ("namespace", ns.clone()),
        ];
        self.recorded("References", args, |conn| {
            let mut params = vec![("ObjectName", target.to_param())];
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());
            push_bool(&mut params, "IncludeQualifiers", options.include_qualifiers);
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());

            let rsp = conn.imethodcall("References", &ns, params)?;
            let children = conn.list_return("References", rsp)?;
            tupleparse::objects_with_path(children).map_err(|e| conn.enrich_protocol(e))
        })
    }

    /// Retrieve the paths of the association objects referring to a class
    /// or instance.
    pub fn reference_names(
        &mut self,
        object_name: impl Into<ObjectName>,
        namespace: Option<&str>,
        options: &ReferenceOptions,
    ) -> Result<Vec<CimObjectPath>> {
        let target = object_name.into();
        let ns = self.resolve_namespace(namespace, target.namespace());
        let args = vec![
            ("ObjectName", target.describe()),
            ("namespace", ns.clone()),
        ];
        self.recorded("ReferenceNames", args, |conn| {
            let mut params = vec![("ObjectName", target.to_param())];
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());

            let rsp = conn.imethodcall("ReferenceNames", &ns, params)?;
            let children = conn.list_return("ReferenceNames", rsp)?;
            tupleparse::object_paths(children).map_err(|e| conn.enrich_protocol(e))
        })
    }

    // ------------------------------------------------------------------
    // Query and extrinsic methods
    // ------------------------------------------------------------------

    /// Execute a query. Returned instances that carry a path get the
    /// effective namespace stamped in; instances delivered without any
    /// path (`VALUE.OBJECT`) come back with `path() == None`.
    pub fn exec_query(
        &mut self,
        query_language: &str,
        query: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<CimInstance>> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("QueryLanguage", query_language.to_owned()),
            ("Query", query.to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("ExecQuery", args, |conn| {
            let params = vec![
                ("QueryLanguage", OpParam::String(query_language.to_owned())),
                ("Query", OpParam::String(query.to_owned())),
            ];
            let rsp = conn.imethodcall("ExecQuery", &ns, params)?;
            let children = conn.list_return("ExecQuery", rsp)?;
            let objects =
                tupleparse::query_objects(children).map_err(|e| conn.enrich_protocol(e))?;
            let mut instances = Vec::with_capacity(objects.len());
            for object in objects {
                match object {
                    CimObject::Instance(mut instance) => {
                        if let Some(path) = instance.path_mut() {
                            path.set_namespace(Some(ns.clone()));
                        }
                        instances.push(instance);
                    }
                    CimObject::Class(_) => {
                        return Err(conn.enrich_protocol(ProtocolError::UnexpectedElement {
                            expected: "INSTANCE",
                            found: "CLASS".to_owned(),
                            context: "ExecQuery",
                        }));
                    }
                }
            }
            Ok(instances)
        })
    }

    /// Invoke an extrinsic method on a class or instance. Returns the
    /// return value and the named output parameters; NULL output
    /// parameters are omitted.
    pub fn invoke_method(
        &mut self,
        method: &str,
        object_name: impl Into<ObjectName>,
        params: Vec<(String, CimValue)>,
    ) -> Result<(Option<CimValue>, NameMap<CimValue>)> {
        let target = object_name.into();
        let ns = self.resolve_namespace(None, target.namespace());
        request::check_method_params(&params)?;

        let path = match &target {
            ObjectName::Instance(path) => {
                let mut path = path.clone();
                path.set_namespace(Some(ns.clone()));
                path.set_host(None);
                path
            }
            ObjectName::Class { name, .. } => CimObjectPath::new(name.clone()).with_namespace(ns),
        };

        let args = vec![
            ("MethodName", method.to_owned()),
            ("ObjectName", target.describe()),
        ];
        self.recorded("InvokeMethod", args, |conn| {
            let body = request::build_methodcall(method, &path, &params)?;
            let request_text = String::from_utf8(body).map_err(|e| {
                WbemError::Build(BuildError::Write {
                    message: e.to_string(),
                })
            })?;
            let object_header = path.to_string();
            let reply_body = conn.round_trip(method, &object_header, request_text)?;

            let tree =
                TupleTree::parse(&reply_body).map_err(|source| WbemError::MalformedXml {
                    source,
                    request: conn.last.raw_request.clone().map(String::into_boxed_str),
                    reply: conn.last.raw_reply.clone().map(String::into_boxed_str),
                })?;
            let rsp = match tupleparse::reduce_method_response(tree, method) {
                Ok(rsp) => rsp,
                Err(RspError::Protocol(source)) => return Err(conn.enrich_protocol(source)),
                Err(RspError::Cim(source)) => {
                    return Err(WbemError::Cim {
                        source,
                        request: conn.last.raw_request.clone().map(String::into_boxed_str),
                        reply: conn.last.raw_reply.clone().map(String::into_boxed_str),
                    });
                }
            };

            let mut out_params = NameMap::new();
            for param in rsp.out_params {
                if let Some(value) = param.value {
                    out_params.insert(param.name, value);
                }
            }
            Ok((rsp.return_value, out_params))
        })
    }

    // ------------------------------------------------------------------
    // Class operations
    // ------------------------------------------------------------------

    /// Retrieve one class declaration.
    pub fn get_class(
        &mut self,
        classname: &str,
        namespace: Option<&str>,
        options: &GetClassOptions,
    ) -> Result<CimClass> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("GetClass", args, |conn| {
            let mut params = vec![("ClassName", OpParam::ClassName(classname.to_owned()))];
            push_bool(&mut params, "LocalOnly", options.local_only);
            push_bool(&mut params, "IncludeQualifiers", options.include_qualifiers);
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());

            let rsp = conn.imethodcall("GetClass", &ns, params)?;
            let child = conn.single_return("GetClass", rsp)?;
            tupleparse::parse_class(&child).map_err(|e| conn.enrich_protocol(e))
        })
    }

    /// Enumerate class declarations, optionally below a starting class.
    pub fn enumerate_classes(
        &mut self,
        classname: Option<&str>,
        namespace: Option<&str>,
        options: &EnumerateClassesOptions,
    ) -> Result<Vec<CimClass>> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.unwrap_or("(root)").to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("EnumerateClasses", args, |conn| {
            let mut params = Vec::new();
            if let Some(name) = classname {
                params.push(("ClassName", OpParam::ClassName(name.to_owned())));
            }
            push_bool(&mut params, "DeepInheritance", options.deep_inheritance);
            push_bool(&mut params, "LocalOnly", options.local_only);
            push_bool(&mut params, "IncludeQualifiers", options.include_qualifiers);
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);

            let rsp = conn.imethodcall("EnumerateClasses", &ns, params)?;
            let children = conn.list_return("EnumerateClasses", rsp)?;
            tupleparse::classes(children).map_err(|e| conn.enrich_protocol(e))
        })
    }

    /// Enumerate class names, optionally below a starting class.
    pub fn enumerate_class_names(
        &mut self,
        classname: Option<&str>,
        namespace: Option<&str>,
        deep_inheritance: Option<bool>,
    ) -> Result<Vec<String>> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.unwrap_or("(root)").to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("EnumerateClassNames", args, |conn| {
            let mut params = Vec::new();
            if let Some(name) = classname {
                params.push(("ClassName", OpParam::ClassName(name.to_owned())));
            }
            push_bool(&mut params, "DeepInheritance", deep_inheritance);

            let rsp = conn.imethodcall("EnumerateClassNames", &ns, params)?;
            let children = conn.list_return("EnumerateClassNames", rsp)?;
            tupleparse::class_names(children).map_err(|e| conn.enrich_protocol(e))
        })
    }

    /// Create a class.
    pub fn create_class(&mut self, class: &CimClass, namespace: Option<&str>) -> Result<()> {
        let ns = self.resolve_namespace(namespace, class.path().and_then(|p| p.namespace()));
        let args = vec![
            ("NewClass", class.classname().to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("CreateClass", args, |conn| {
            let params = vec![("NewClass", OpParam::Class(class.clone()))];
            let rsp = conn.imethodcall("CreateClass", &ns, params)?;
            conn.expect_void("CreateClass", rsp)
        })
    }

    /// Modify a class declaration.
    pub fn modify_class(&mut self, class: &CimClass, namespace: Option<&str>) -> Result<()> {
        let ns = self.resolve_namespace(namespace, class.path().and_then(|p| p.namespace()));
        let args = vec![
            ("ModifiedClass", class.classname().to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("ModifyClass", args, |conn| {
            let params = vec![("ModifiedClass", OpParam::Class(class.clone()))];
            let rsp = conn.imethodcall("ModifyClass", &ns, params)?;
            conn.expect_void("ModifyClass", rsp)
        })
    }

    /// Delete a class.
    pub fn delete_class(&mut self, classname: &str, namespace: Option<&str>) -> Result<()> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("DeleteClass", args, |conn| {
            let params = vec![("ClassName", OpParam::ClassName(classname.to_owned()))];
            let rsp = conn.imethodcall("DeleteClass", &ns, params)?;
            conn.expect_void("DeleteClass", rsp)
        })
    }

    // ------------------------------------------------------------------
    // Qualifier-declaration operations
    // ------------------------------------------------------------------

    /// Retrieve one qualifier declaration.
    pub fn get_qualifier(
        &mut self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<CimQualifierDeclaration> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![("QualifierName", name.to_owned()), ("namespace", ns.clone())];
        self.recorded("GetQualifier", args, |conn| {
            let params = vec![("QualifierName", OpParam::String(name.to_owned()))];
            let rsp = conn.imethodcall("GetQualifier", &ns, params)?;
            let child = conn.single_return("GetQualifier", rsp)?;
            tupleparse::parse_qualifier_declaration(&child).map_err(|e| conn.enrich_protocol(e))
        })
    }

    /// Create or replace a qualifier declaration.
    pub fn set_qualifier(
        &mut self,
        declaration: &CimQualifierDeclaration,
        namespace: Option<&str>,
    ) -> Result<()> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("QualifierDeclaration", declaration.name().to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("SetQualifier", args, |conn| {
            let params = vec![(
                "QualifierDeclaration",
                OpParam::QualifierDecl(declaration.clone()),
            )];
            let rsp = conn.imethodcall("SetQualifier", &ns, params)?;
            conn.expect_void("SetQualifier", rsp)
        })
    }

    /// Delete a qualifier declaration.
    pub fn delete_qualifier(&mut self, name: &str, namespace: Option<&str>) -> Result<()> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![("QualifierName", name.to_owned()), ("namespace", ns.clone())];
        self.recorded("DeleteQualifier", args, |conn| {
            let params = vec![("QualifierName", OpParam::String(name.to_owned()))];
            let rsp = conn.imethodcall("DeleteQualifier", &ns, params)?;
            conn.expect_void("DeleteQualifier", rsp)
        })
    }

    /// Enumerate the qualifier declarations of a namespace.
    pub fn enumerate_qualifiers(
        &mut self,
        namespace: Option<&str>,
    ) -> Result<Vec<CimQualifierDeclaration>> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![("namespace", ns.clone())];
        self.recorded("EnumerateQualifiers", args, |conn| {
            let rsp = conn.imethodcall("EnumerateQualifiers", &ns, Vec::new())?;
            let children = conn.list_return("EnumerateQualifiers", rsp)?;
            tupleparse::qualifier_declarations(children).map_err(|e| conn.enrich_protocol(e))
        })
    }

    // ------------------------------------------------------------------
    // Pull operations
    // ------------------------------------------------------------------

    /// Open a paged enumeration of instances (with paths).
    pub fn open_enumerate_instances(
        &mut self,
        classname: &str,
        namespace: Option<&str>,
        options: &EnumerateInstancesOptions,
        open: &OpenOptions,
    ) -> Result<PulledInstances> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.to_owned()),
            ("namespace", ns.clone()),
            ("MaxObjectCount", open.max_object_count.to_string()),
        ];
        self.recorded("OpenEnumerateInstances", args, |conn| {
            let mut params = vec![("ClassName", OpParam::ClassName(classname.to_owned()))];
            push_bool(&mut params, "DeepInheritance", options.deep_inheritance);
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());
            push_open_params(&mut params, open);

            let rsp = conn.imethodcall("OpenEnumerateInstances", &ns, params)?;
            conn.pulled_instances_with_path("OpenEnumerateInstances", rsp, &ns)
        })
    }

    /// Open a paged enumeration of instance paths.
    pub fn open_enumerate_instance_paths(
        &mut self,
        classname: &str,
        namespace: Option<&str>,
        open: &OpenOptions,
    ) -> Result<PulledPaths> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("ClassName", classname.to_owned()),
            ("namespace", ns.clone()),
            ("MaxObjectCount", open.max_object_count.to_string()),
        ];
        self.recorded("OpenEnumerateInstancePaths", args, |conn| {
            let mut params = vec![("ClassName", OpParam::ClassName(classname.to_owned()))];
            push_open_params(&mut params, open);
            let rsp = conn.imethodcall("OpenEnumerateInstancePaths", &ns, params)?;
            conn.pulled_paths("OpenEnumerateInstancePaths", rsp, &ns)
        })
    }

    /// Open a paged traversal of associated instances. The source must be
    /// an instance path. Qualifiers cannot be requested on the pull plane.
    pub fn open_associator_instances(
        &mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &AssociatorOptions,
        open: &OpenOptions,
    ) -> Result<PulledInstances> {
        let ns = self.resolve_namespace(namespace, source.namespace());
        require_instance_path(source, "OpenAssociatorInstances")?;
        let args = vec![("InstanceName", source.to_string()), ("namespace", ns.clone())];
        self.recorded("OpenAssociatorInstances", args, |conn| {
            let mut params = vec![("InstanceName", OpParam::InstanceName(source.clone()))];
            push_classname(&mut params, "AssocClass", options.assoc_class.as_deref());
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());
            push_string(&mut params, "ResultRole", options.result_role.as_deref());
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());
            push_open_params(&mut params, open);

            let rsp = conn.imethodcall("OpenAssociatorInstances", &ns, params)?;
            conn.pulled_instances_with_path("OpenAssociatorInstances", rsp, &ns)
        })
    }

    /// Open a paged traversal of associated instance paths.
    pub fn open_associator_instance_paths(
        &mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &AssociatorOptions,
        open: &OpenOptions,
    ) -> Result<PulledPaths> {
        let ns = self.resolve_namespace(namespace, source.namespace());
        require_instance_path(source, "OpenAssociatorInstancePaths")?;
        let args = vec![("InstanceName", source.to_string()), ("namespace", ns.clone())];
        self.recorded("OpenAssociatorInstancePaths", args, |conn| {
            let mut params = vec![("InstanceName", OpParam::InstanceName(source.clone()))];
            push_classname(&mut params, "AssocClass", options.assoc_class.as_deref());
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());
            push_string(&mut params, "ResultRole", options.result_role.as_deref());
            push_open_params(&mut params, open);

            let rsp = conn.imethodcall("OpenAssociatorInstancePaths", &ns, params)?;
            conn.pulled_paths("OpenAssociatorInstancePaths", rsp, &ns)
        })
    }

    /// Open a paged traversal of referencing instances.
    pub fn open_reference_instances(
        &mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &ReferenceOptions,
        open: &OpenOptions,
    ) -> Result<PulledInstances> {
        let ns = self.resolve_namespace(namespace, source.namespace());
        require_instance_path(source, "OpenReferenceInstances")?;
        let args = vec![("InstanceName", source.to_string()), ("namespace", ns.clone())];
        self.recorded("OpenReferenceInstances", args, |conn| {
            let mut params = vec![("InstanceName", OpParam::InstanceName(source.clone()))];
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());
            push_bool(&mut params, "IncludeClassOrigin", options.include_class_origin);
            push_property_list(&mut params, options.property_list.as_ref());
            push_open_params(&mut params, open);

            let rsp = conn.imethodcall("OpenReferenceInstances", &ns, params)?;
            conn.pulled_instances_with_path("OpenReferenceInstances", rsp, &ns)
        })
    }

    /// Open a paged traversal of referencing instance paths.
    pub fn open_reference_instance_paths(
        &mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &ReferenceOptions,
        open: &OpenOptions,
    ) -> Result<PulledPaths> {
        let ns = self.resolve_namespace(namespace, source.namespace());
        require_instance_path(source, "OpenReferenceInstancePaths")?;
        let args = vec![("InstanceName", source.to_string()), ("namespace", ns.clone())];
        self.recorded("OpenReferenceInstancePaths", args, |conn| {
            let mut params = vec![("InstanceName", OpParam::InstanceName(source.clone()))];
            push_classname(&mut params, "ResultClass", options.result_class.as_deref());
            push_string(&mut params, "Role", options.role.as_deref());
            push_open_params(&mut params, open);

            let rsp = conn.imethodcall("OpenReferenceInstancePaths", &ns, params)?;
            conn.pulled_paths("OpenReferenceInstancePaths", rsp, &ns)
        })
    }

    /// Open a paged query execution. The returned instances carry no
    /// paths.
    pub fn open_query_instances(
        &mut self,
        query_language: &str,
        query: &str,
        namespace: Option<&str>,
        return_query_result_class: Option<bool>,
        open: &OpenOptions,
    ) -> Result<QueryOpenResult> {
        let ns = self.resolve_namespace(namespace, None);
        let args = vec![
            ("FilterQueryLanguage", query_language.to_owned()),
            ("FilterQuery", query.to_owned()),
            ("namespace", ns.clone()),
        ];
        self.recorded("OpenQueryInstances", args, |conn| {
            let mut params = vec![
                (
                    "FilterQueryLanguage",
                    OpParam::String(query_language.to_owned()),
                ),
                ("FilterQuery", OpParam::String(query.to_owned())),
            ];
            push_bool(&mut params, "ReturnQueryResultClass", return_query_result_class);
            if let Some(timeout) = open.operation_timeout {
                params.push(("OperationTimeout", OpParam::Uint32(timeout)));
            }
            push_bool(&mut params, "ContinueOnError", open.continue_on_error);
            params.push(("MaxObjectCount", OpParam::Uint32(open.max_object_count)));

            let rsp = conn.imethodcall("OpenQueryInstances", &ns, params)?;

            let mut query_result_class = None;
            let mut status_params = Vec::new();
            for param in &rsp.out_params {
                if param.name.eq_ignore_ascii_case("QueryResultClass") {
                    query_result_class = match &param.value {
                        Some(CimValue::Class(class)) => Some((**class).clone()),
                        None => None,
                        other => {
                            return Err(conn.enrich_protocol(ProtocolError::InvalidAttribute {
                                attribute: "QueryResultClass",
                                element: "PARAMVALUE",
                                value: format!("{other:?}"),
                                reason: "expected a CLASS value".into(),
                            }));
                        }
                    };
                } else {
                    status_params.push(param.clone());
                }
            }
            let context = conn.pull_status(&status_params, &ns)?;
            let children = rsp.return_children.unwrap_or_default();
            let instances =
                tupleparse::plain_instances(children).map_err(|e| conn.enrich_protocol(e))?;
            Ok(QueryOpenResult {
                instances,
                query_result_class,
                context,
            })
        })
    }

    /// Pull the next page of instances (with paths) from an open session.
    pub fn pull_instances_with_path(
        &mut self,
        context: &EnumerationContext,
        max_object_count: u32,
    ) -> Result<PulledInstances> {
        check_max_object_count(max_object_count)?;
        let ns = context.namespace().to_owned();
        let args = vec![
            ("EnumerationContext", context.context().to_owned()),
            ("MaxObjectCount", max_object_count.to_string()),
        ];
        let ctx = context.context().to_owned();
        self.recorded("PullInstancesWithPath", args, |conn| {
            let params = vec![
                ("EnumerationContext", OpParam::String(ctx.clone())),
                ("MaxObjectCount", OpParam::Uint32(max_object_count)),
            ];
            let rsp = conn.imethodcall("PullInstancesWithPath", &ns, params)?;
            conn.pulled_instances_with_path("PullInstancesWithPath", rsp, &ns)
        })
    }

    /// Pull the next page of instance paths from an open session.
    pub fn pull_instance_paths(
        &mut self,
        context: &EnumerationContext,
        max_object_count: u32,
    ) -> Result<PulledPaths> {
        check_max_object_count(max_object_count)?;
        let ns = context.namespace().to_owned();
        let args = vec![
            ("EnumerationContext", context.context().to_owned()),
            ("MaxObjectCount", max_object_count.to_string()),
        ];
        let ctx = context.context().to_owned();
        self.recorded("PullInstancePaths", args, |conn| {
            let params = vec![
                ("EnumerationContext", OpParam::String(ctx.clone())),
                ("MaxObjectCount", OpParam::Uint32(max_object_count)),
            ];
            let rsp = conn.imethodcall("PullInstancePaths", &ns, params)?;
            conn.pulled_paths("PullInstancePaths", rsp, &ns)
        })
    }

    /// Pull the next page of path-less instances (query sessions).
    pub fn pull_instances(
        &mut self,
        context: &EnumerationContext,
        max_object_count: u32,
    ) -> Result<PulledInstances> {
        check_max_object_count(max_object_count)?;
        let ns = context.namespace().to_owned();
        let args = vec![
            ("EnumerationContext", context.context().to_owned()),
            ("MaxObjectCount", max_object_count.to_string()),
        ];
        let ctx = context.context().to_owned();
        self.recorded("PullInstances", args, |conn| {
            let params = vec![
                ("EnumerationContext", OpParam::String(ctx.clone())),
                ("MaxObjectCount", OpParam::Uint32(max_object_count)),
            ];
            let rsp = conn.imethodcall("PullInstances", &ns, params)?;
            let context = conn.pull_status(&rsp.out_params, &ns)?;
            let children = rsp.return_children.unwrap_or_default();
            let instances =
                tupleparse::plain_instances(children).map_err(|e| conn.enrich_protocol(e))?;
            Ok(PulledInstances { instances, context })
        })
    }

    /// Close an open enumeration session before its sequence is exhausted.
    pub fn close_enumeration(&mut self, context: &EnumerationContext) -> Result<()> {
        let ns = context.namespace().to_owned();
        let args = vec![("EnumerationContext", context.context().to_owned())];
        let ctx = context.context().to_owned();
        self.recorded("CloseEnumeration", args, |conn| {
            let params = vec![("EnumerationContext", OpParam::String(ctx.clone()))];
            let rsp = conn.imethodcall("CloseEnumeration", &ns, params)?;
            conn.expect_void("CloseEnumeration", rsp)
        })
    }

    // Shared pull-response handling.

    fn pulled_instances_with_path(
        &mut self,
        operation: &'static str,
        rsp: IMethodResponse,
        namespace: &str,
    ) -> Result<PulledInstances> {
        let context = self.pull_status(&rsp.out_params, namespace)?;
        let children = rsp.return_children.unwrap_or_default();
        let instances =
            tupleparse::instances_with_path(children).map_err(|e| self.enrich_protocol(e))?;
        trace!("{operation}: {} instances, open={}", instances.len(), context.is_some());
        Ok(PulledInstances { instances, context })
    }

    fn pulled_paths(
        &mut self,
        operation: &'static str,
        rsp: IMethodResponse,
        namespace: &str,
    ) -> Result<PulledPaths> {
        let context = self.pull_status(&rsp.out_params, namespace)?;
        let children = rsp.return_children.unwrap_or_default();
        let paths = tupleparse::instance_paths(children).map_err(|e| self.enrich_protocol(e))?;
        trace!("{operation}: {} paths, open={}", paths.len(), context.is_some());
        Ok(PulledPaths { paths, context })
    }

    /// Enforce the pull-response status shape: `EndOfSequence` must be
    /// present; a continuing sequence must carry a context; a finished
    /// one must not be reused.
    fn pull_status(
        &self,
        out_params: &[ParamValue],
        namespace: &str,
    ) -> Result<Option<EnumerationContext>> {
        let mut end_of_sequence: Option<bool> = None;
        let mut context: Option<String> = None;
        for param in out_params {
            if param.name.eq_ignore_ascii_case("EndOfSequence") {
                end_of_sequence = match &param.value {
                    Some(CimValue::Boolean(b)) => Some(*b),
                    other => {
                        return Err(self.enrich_protocol(ProtocolError::InvalidAttribute {
                            attribute: "EndOfSequence",
                            element: "PARAMVALUE",
                            value: format!("{other:?}"),
                            reason: "expected a boolean value".into(),
                        }));
                    }
                };
            } else if param.name.eq_ignore_ascii_case("EnumerationContext") {
                context = match &param.value {
                    Some(CimValue::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(CimValue::String(_)) | None => None,
                    other => {
                        return Err(self.enrich_protocol(ProtocolError::InvalidAttribute {
                            attribute: "EnumerationContext",
                            element: "PARAMVALUE",
                            value: format!("{other:?}"),
                            reason: "expected a string value".into(),
                        }));
                    }
                };
            } else {
                return Err(self.enrich_protocol(ProtocolError::UnexpectedElement {
                    expected: "EndOfSequence or EnumerationContext",
                    found: param.name.clone(),
                    context: "pull response",
                }));
            }
        }
        match end_of_sequence {
            None => Err(self.enrich_protocol(ProtocolError::MissingPullStatus)),
            Some(true) => Ok(None),
            Some(false) => match context {
                Some(token) => Ok(Some(EnumerationContext::new(token, namespace.to_owned()))),
                None => Err(self.enrich_protocol(ProtocolError::MissingPullContext)),
            },
        }
    }
}

fn check_max_object_count(max_object_count: u32) -> std::result::Result<(), ParameterError> {
    if max_object_count == 0 {
        return Err(ParameterError::InvalidMaxObjectCount);
    }
    Ok(())
}

fn require_instance_path(
    path: &CimObjectPath,
    operation: &'static str,
) -> std::result::Result<(), ParameterError> {
    if !path.is_instance_path() {
        return Err(ParameterError::MissingInstancePath { operation });
    }
    Ok(())
}

fn push_bool(params: &mut Vec<(&'static str, OpParam)>, name: &'static str, value: Option<bool>) {
    if let Some(v) = value {
        params.push((name, OpParam::Boolean(v)));
    }
}

fn push_string(params: &mut Vec<(&'static str, OpParam)>, name: &'static str, value: Option<&str>) {
    if let Some(v) = value {
        params.push((name, OpParam::String(v.to_owned())));
    }
}

fn push_classname(
    params: &mut Vec<(&'static str, OpParam)>,
    name: &'static str,
    value: Option<&str>,
) {
    if let Some(v) = value {
        params.push((name, OpParam::ClassName(v.to_owned())));
    }
}

fn push_property_list(params: &mut Vec<(&'static str, OpParam)>, list: Option<&PropertyList>) {
    if let Some(list) = list {
        params.push(("PropertyList", OpParam::StringArray(list.names().to_vec())));
    }
}

fn push_open_params(params: &mut Vec<(&'static str, OpParam)>, open: &OpenOptions) {
    if let Some(lang) = &open.filter_query_language {
        params.push(("FilterQueryLanguage", OpParam::String(lang.clone())));
    }
    if let Some(query) = &open.filter_query {
        params.push(("FilterQuery", OpParam::String(query.clone())));
    }
    if let Some(timeout) = open.operation_timeout {
        params.push(("OperationTimeout", OpParam::Uint32(timeout)));
    }
    push_bool(params, "ContinueOnError", open.continue_on_error);
    params.push(("MaxObjectCount", OpParam::Uint32(open.max_object_count)));
}

#[cfg(feature = "http")]
impl WbemConnection<crate::transport::UreqTransport> {
    /// Connect to a CIMOM over HTTP(S) with the default transport.
    pub fn connect(url: impl Into<String>) -> Self {
        WbemConnection::with_transport(crate::transport::UreqTransport::new(), url)
    }
}
