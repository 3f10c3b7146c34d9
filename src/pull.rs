//! Lazy, cancellable iteration over the six Open/Pull operation families,
//! with transparent fallback to the traditional one-shot operations when a
//! server rejects the pull variant.
//!
//! Each `iter_*` call is its own little state machine: it starts unprobed,
//! moves into pulling or the traditional path on first advance, and ends
//! exhausted. A still-open server-side session is closed on every exit
//! path, including the caller simply dropping the iterator mid-sequence.

use std::vec;

use log::{debug, warn};

use crate::cim::{CimClass, CimInstance, CimObject, CimObjectPath};
use crate::connection::{
    AssociatorOptions, EnumerateInstancesOptions, EnumerationContext, OpenOptions,
    PullCapability, PullFamily, PullMode, PulledInstances, PulledPaths, ReferenceOptions,
    WbemConnection,
};
use crate::err::{ParameterError, ProtocolError, Result};
use crate::transport::WbemTransport;

/// Outcome of an open probe: a real first page, or the server's signal
/// that this operation family must use the traditional path. Only a
/// first-ever probe answered with `CIM_ERR_NOT_SUPPORTED` produces
/// `Fallback`; every other failure propagates.
enum Probe<P> {
    Page(P),
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    NotStarted,
    Pulling,
    Traditional,
    Exhausted,
    Failed,
}

#[derive(Debug, Clone)]
enum InstanceIterRequest {
    Enumerate {
        classname: String,
        options: EnumerateInstancesOptions,
    },
    Associators {
        source: CimObjectPath,
        options: AssociatorOptions,
    },
    References {
        source: CimObjectPath,
        options: ReferenceOptions,
    },
}

impl InstanceIterRequest {
    fn family(&self) -> PullFamily {
        match self {
            InstanceIterRequest::Enumerate { .. } => PullFamily::EnumInstances,
            InstanceIterRequest::Associators { .. } => PullFamily::AssocInstances,
            InstanceIterRequest::References { .. } => PullFamily::RefInstances,
        }
    }
}

#[derive(Debug, Clone)]
enum PathIterRequest {
    Enumerate {
        classname: String,
    },
    Associators {
        source: CimObjectPath,
        options: AssociatorOptions,
    },
    References {
        source: CimObjectPath,
        options: ReferenceOptions,
    },
}

impl PathIterRequest {
    fn family(&self) -> PullFamily {
        match self {
            PathIterRequest::Enumerate { .. } => PullFamily::EnumPaths,
            PathIterRequest::Associators { .. } => PullFamily::AssocPaths,
            PathIterRequest::References { .. } => PullFamily::RefPaths,
        }
    }
}

/// Reject open-only parameters before a traditional call is issued; the
/// traditional operations cannot express them.
fn check_traditional_compatible(open: &OpenOptions) -> std::result::Result<(), ParameterError> {
    if open.filter_query.is_some() {
        return Err(ParameterError::FilterNotSupported {
            parameter: "FilterQuery",
        });
    }
    if open.filter_query_language.is_some() {
        return Err(ParameterError::FilterNotSupported {
            parameter: "FilterQueryLanguage",
        });
    }
    if open.continue_on_error.is_some() {
        return Err(ParameterError::FilterNotSupported {
            parameter: "ContinueOnError",
        });
    }
    Ok(())
}

fn check_page_size(open: &OpenOptions) -> std::result::Result<(), ParameterError> {
    if open.max_object_count == 0 {
        return Err(ParameterError::InvalidMaxObjectCount);
    }
    Ok(())
}

fn require_instance_source(
    source: &CimObjectPath,
    operation: &'static str,
) -> std::result::Result<(), ParameterError> {
    if !source.is_instance_path() {
        return Err(ParameterError::MissingInstancePath { operation });
    }
    Ok(())
}

/// Should this call begin with a pull probe, given the connection policy
/// and what earlier calls have learned?
fn should_pull<T: WbemTransport>(conn: &WbemConnection<T>, family: PullFamily) -> bool {
    match (conn.pull_mode(), conn.pull_caps.get(family)) {
        (PullMode::Never, _) => false,
        (_, PullCapability::Unsupported) => false,
        _ => true,
    }
}

fn fallback_applies<T: WbemTransport>(
    conn: &WbemConnection<T>,
    family: PullFamily,
    error: &crate::err::WbemError,
) -> bool {
    error.is_not_supported()
        && conn.pull_mode() == PullMode::Auto
        && conn.pull_caps.get(family) == PullCapability::Unknown
}

/// A lazy sequence of instances over one enumeration, association or
/// reference traversal. Yields one page at a time; dropping it before
/// exhaustion closes the server-side session.
pub struct InstanceIter<'c, T: WbemTransport> {
    conn: &'c mut WbemConnection<T>,
    request: InstanceIterRequest,
    namespace: Option<String>,
    open: OpenOptions,
    state: IterState,
    page: vec::IntoIter<CimInstance>,
    context: Option<EnumerationContext>,
}

impl<'c, T: WbemTransport> InstanceIter<'c, T> {
    fn new(
        conn: &'c mut WbemConnection<T>,
        request: InstanceIterRequest,
        namespace: Option<&str>,
        open: OpenOptions,
    ) -> Self {
        InstanceIter {
            conn,
            request,
            namespace: namespace.map(str::to_owned),
            open,
            state: IterState::NotStarted,
            page: Vec::new().into_iter(),
            context: None,
        }
    }

    /// Close the server-side session now, propagating any close failure.
    /// Idempotent; also called (failure-tolerantly) on drop.
    pub fn close(&mut self) -> Result<()> {
        self.state = IterState::Exhausted;
        if let Some(context) = self.context.take() {
            self.conn.close_enumeration(&context)?;
        }
        Ok(())
    }

    fn open_call(&mut self) -> Result<PulledInstances> {
        let ns = self.namespace.as_deref();
        match &self.request {
            InstanceIterRequest::Enumerate { classname, options } => {
                self.conn
                    .open_enumerate_instances(classname, ns, options, &self.open)
            }
            InstanceIterRequest::Associators { source, options } => {
                self.conn
                    .open_associator_instances(source, ns, options, &self.open)
            }
            InstanceIterRequest::References { source, options } => {
                self.conn
                    .open_reference_instances(source, ns, options, &self.open)
            }
        }
    }

    fn try_open(&mut self, family: PullFamily) -> Result<Probe<PulledInstances>> {
        match self.open_call() {
            Ok(page) => Ok(Probe::Page(page)),
            Err(error) if fallback_applies(self.conn, family, &error) => {
                debug!("open rejected as unsupported; falling back to traditional operation");
                Ok(Probe::Fallback)
            }
            Err(error) => Err(error),
        }
    }

    fn run_traditional(&mut self) -> Result<()> {
        let ns = self.namespace.as_deref();
        let instances = match &self.request {
            InstanceIterRequest::Enumerate { classname, options } => {
                self.conn.enumerate_instances(classname, ns, options)?
            }
            InstanceIterRequest::Associators { source, options } => {
                let objects = self.conn.associators(source.clone(), ns, options)?;
                objects_into_instances(self.conn, objects)?
            }
            InstanceIterRequest::References { source, options } => {
                let objects = self.conn.references(source.clone(), ns, options)?;
                objects_into_instances(self.conn, objects)?
            }
        };
        self.page = instances.into_iter();
        self.state = IterState::Traditional;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let family = self.request.family();
        if !should_pull(self.conn, family) {
            check_traditional_compatible(&self.open)?;
            return self.run_traditional();
        }
        match self.try_open(family)? {
            Probe::Page(page) => {
                self.conn.pull_caps.commit(family, PullCapability::Supported);
                self.page = page.instances.into_iter();
                self.context = page.context;
                self.state = IterState::Pulling;
                Ok(())
            }
            Probe::Fallback => {
                self.conn
                    .pull_caps
                    .commit(family, PullCapability::Unsupported);
                check_traditional_compatible(&self.open)?;
                self.run_traditional()
            }
        }
    }

    fn pull_next_page(&mut self, context: EnumerationContext) -> Result<()> {
        match self
            .conn
            .pull_instances_with_path(&context, self.open.max_object_count)
        {
            Ok(page) => {
                self.page = page.instances.into_iter();
                self.context = page.context;
                Ok(())
            }
            Err(error) => {
                // Keep the context so teardown can still close the session.
                self.context = Some(context);
                Err(error)
            }
        }
    }
}

impl<T: WbemTransport> Iterator for InstanceIter<'_, T> {
    type Item = Result<CimInstance>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(instance) = self.page.next() {
                return Some(Ok(instance));
            }
            match self.state {
                IterState::NotStarted => {
                    if let Err(error) = self.start() {
                        self.state = IterState::Failed;
                        return Some(Err(error));
                    }
                }
                IterState::Pulling => match self.context.take() {
                    Some(context) => {
                        if let Err(error) = self.pull_next_page(context) {
                            self.state = IterState::Failed;
                            return Some(Err(error));
                        }
                    }
                    None => {
                        self.state = IterState::Exhausted;
                        return None;
                    }
                },
                IterState::Traditional => {
                    self.state = IterState::Exhausted;
                    return None;
                }
                IterState::Exhausted | IterState::Failed => return None,
            }
        }
    }
}

impl<T: WbemTransport> Drop for InstanceIter<'_, T> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            if let Err(error) = self.conn.close_enumeration(&context) {
                warn!(
                    "failed to close abandoned enumeration {}: {error}",
                    context.context()
                );
            }
        }
    }
}

fn objects_into_instances<T: WbemTransport>(
    conn: &WbemConnection<T>,
    objects: Vec<CimObject>,
) -> Result<Vec<CimInstance>> {
    objects
        .into_iter()
        .map(|object| match object {
            CimObject::Instance(instance) => Ok(instance),
            CimObject::Class(_) => Err(conn.enrich_protocol(ProtocolError::UnexpectedElement {
                expected: "an instance result",
                found: "CLASS".to_owned(),
                context: "association traversal",
            })),
        })
        .collect()
}

/// A lazy sequence of instance paths; the path-flavored sibling of
/// [`InstanceIter`].
pub struct PathIter<'c, T: WbemTransport> {
    conn: &'c mut WbemConnection<T>,
    request: PathIterRequest,
    namespace: Option<String>,
    open: OpenOptions,
    state: IterState,
    page: vec::IntoIter<CimObjectPath>,
    context: Option<EnumerationContext>,
}

impl<'c, T: WbemTransport> PathIter<'c, T> {
    fn new(
        conn: &'c mut WbemConnection<T>,
        request: PathIterRequest,
        namespace: Option<&str>,
        open: OpenOptions,
    ) -> Self {
        PathIter {
            conn,
            request,
            namespace: namespace.map(str::to_owned),
            open,
            state: IterState::NotStarted,
            page: Vec::new().into_iter(),
            context: None,
        }
    }

    /// Close the server-side session now, propagating any close failure.
    pub fn close(&mut self) -> Result<()> {
        self.state = IterState::Exhausted;
        if let Some(context) = self.context.take() {
            self.conn.close_enumeration(&context)?;
        }
        Ok(())
    }

    fn open_call(&mut self) -> Result<PulledPaths> {
        let ns = self.namespace.as_deref();
        match &self.request {
            PathIterRequest::Enumerate { classname } => {
                self.conn
                    .open_enumerate_instance_paths(classname, ns, &self.open)
            }
            PathIterRequest::Associators { source, options } => self
                .conn
                .open_associator_instance_paths(source, ns, options, &self.open),
            PathIterRequest::References { source, options } => self
                .conn
                .open_reference_instance_paths(source, ns, options, &self.open),
        }
    }

    fn run_traditional(&mut self) -> Result<()> {
        let ns = self.namespace.as_deref();
        let paths = match &self.request {
            PathIterRequest::Enumerate { classname } => {
                self.conn.enumerate_instance_names(classname, ns)?
            }
            PathIterRequest::Associators { source, options } => {
                self.conn.associator_names(source.clone(), ns, options)?
            }
            PathIterRequest::References { source, options } => {
                self.conn.reference_names(source.clone(), ns, options)?
            }
        };
        self.page = paths.into_iter();
        self.state = IterState::Traditional;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let family = self.request.family();
        if !should_pull(self.conn, family) {
            check_traditional_compatible(&self.open)?;
            return self.run_traditional();
        }
        let probe = match self.open_call() {
            Ok(page) => Probe::Page(page),
            Err(error) if fallback_applies(self.conn, family, &error) => {
                debug!("open rejected as unsupported; falling back to traditional operation");
                Probe::Fallback
            }
            Err(error) => return Err(error),
        };
        match probe {
            Probe::Page(page) => {
                self.conn.pull_caps.commit(family, PullCapability::Supported);
                self.page = page.paths.into_iter();
                self.context = page.context;
                self.state = IterState::Pulling;
                Ok(())
            }
            Probe::Fallback => {
                self.conn
                    .pull_caps
                    .commit(family, PullCapability::Unsupported);
                check_traditional_compatible(&self.open)?;
                self.run_traditional()
            }
        }
    }

    fn pull_next_page(&mut self, context: EnumerationContext) -> Result<()> {
        match self
            .conn
            .pull_instance_paths(&context, self.open.max_object_count)
        {
            Ok(page) => {
                self.page = page.paths.into_iter();
                self.context = page.context;
                Ok(())
            }
            Err(error) => {
                self.context = Some(context);
                Err(error)
            }
        }
    }
}

impl<T: WbemTransport> Iterator for PathIter<'_, T> {
    type Item = Result<CimObjectPath>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(path) = self.page.next() {
                return Some(Ok(path));
            }
            match self.state {
                IterState::NotStarted => {
                    if let Err(error) = self.start() {
                        self.state = IterState::Failed;
                        return Some(Err(error));
                    }
                }
                IterState::Pulling => match self.context.take() {
                    Some(context) => {
                        if let Err(error) = self.pull_next_page(context) {
                            self.state = IterState::Failed;
                            return Some(Err(error));
                        }
                    }
                    None => {
                        self.state = IterState::Exhausted;
                        return None;
                    }
                },
                IterState::Traditional => {
                    self.state = IterState::Exhausted;
                    return None;
                }
                IterState::Exhausted | IterState::Failed => return None,
            }
        }
    }
}

impl<T: WbemTransport> Drop for PathIter<'_, T> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            if let Err(error) = self.conn.close_enumeration(&context) {
                warn!(
                    "failed to close abandoned enumeration {}: {error}",
                    context.context()
                );
            }
        }
    }
}

/// The fully-drained result of a pulled query execution.
///
/// Query pulling is the one family that cannot stream: the server pairs
/// the result set with a shared query result class that is only complete
/// once every page has been drained, so the whole set is accumulated
/// before iteration begins.
#[derive(Debug)]
pub struct QueryResult {
    query_result_class: Option<CimClass>,
    instances: vec::IntoIter<CimInstance>,
}

impl QueryResult {
    pub fn query_result_class(&self) -> Option<&CimClass> {
        self.query_result_class.as_ref()
    }
}

impl Iterator for QueryResult {
    type Item = CimInstance;

    fn next(&mut self) -> Option<Self::Item> {
        self.instances.next()
    }
}

impl<T: WbemTransport> WbemConnection<T> {
    /// Lazily enumerate the instances of a class, pulling pages of
    /// `open.max_object_count` when the server supports it and falling
    /// back to one-shot EnumerateInstances when it does not.
    pub fn iter_enumerate_instances<'c>(
        &'c mut self,
        classname: &str,
        namespace: Option<&str>,
        options: &EnumerateInstancesOptions,
        open: &OpenOptions,
    ) -> Result<InstanceIter<'c, T>> {
        check_page_size(open)?;
        Ok(InstanceIter::new(
            self,
            InstanceIterRequest::Enumerate {
                classname: classname.to_owned(),
                options: options.clone(),
            },
            namespace,
            open.clone(),
        ))
    }

    /// Lazily enumerate the instance paths of a class.
    pub fn iter_enumerate_instance_paths<'c>(
        &'c mut self,
        classname: &str,
        namespace: Option<&str>,
        open: &OpenOptions,
    ) -> Result<PathIter<'c, T>> {
        check_page_size(open)?;
        Ok(PathIter::new(
            self,
            PathIterRequest::Enumerate {
                classname: classname.to_owned(),
            },
            namespace,
            open.clone(),
        ))
    }

    /// Lazily traverse the instances associated with an instance.
    pub fn iter_associator_instances<'c>(
        &'c mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &AssociatorOptions,
        open: &OpenOptions,
    ) -> Result<InstanceIter<'c, T>> {
        check_page_size(open)?;
        require_instance_source(source, "IterAssociatorInstances")?;
        Ok(InstanceIter::new(
            self,
            InstanceIterRequest::Associators {
                source: source.clone(),
                options: options.clone(),
            },
            namespace,
            open.clone(),
        ))
    }

    /// Lazily traverse the paths of the instances associated with an
    /// instance.
    pub fn iter_associator_instance_paths<'c>(
        &'c mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &AssociatorOptions,
        open: &OpenOptions,
    ) -> Result<PathIter<'c, T>> {
        check_page_size(open)?;
        require_instance_source(source, "IterAssociatorInstancePaths")?;
        Ok(PathIter::new(
            self,
            PathIterRequest::Associators {
                source: source.clone(),
                options: options.clone(),
            },
            namespace,
            open.clone(),
        ))
    }

    /// Lazily traverse the instances referencing an instance.
    pub fn iter_reference_instances<'c>(
        &'c mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &ReferenceOptions,
        open: &OpenOptions,
    ) -> Result<InstanceIter<'c, T>> {
        check_page_size(open)?;
        require_instance_source(source, "IterReferenceInstances")?;
        Ok(InstanceIter::new(
            self,
            InstanceIterRequest::References {
                source: source.clone(),
                options: options.clone(),
            },
            namespace,
            open.clone(),
        ))
    }

    /// Lazily traverse the paths of the instances referencing an instance.
    pub fn iter_reference_instance_paths<'c>(
        &'c mut self,
        source: &CimObjectPath,
        namespace: Option<&str>,
        options: &ReferenceOptions,
        open: &OpenOptions,
    ) -> Result<PathIter<'c, T>> {
        check_page_size(open)?;
        require_instance_source(source, "IterReferenceInstancePaths")?;
        Ok(PathIter::new(
            self,
            PathIterRequest::References {
                source: source.clone(),
                options: options.clone(),
            },
            namespace,
            open.clone(),
        ))
    }

    /// Execute a query, preferring the pull plane and falling back to
    /// ExecQuery. The entire result set is drained before returning; see
    /// [`QueryResult`].
    pub fn iter_query_instances(
        &mut self,
        query_language: &str,
        query: &str,
        namespace: Option<&str>,
        return_query_result_class: Option<bool>,
        open: &OpenOptions,
    ) -> Result<QueryResult> {
        check_page_size(open)?;

        if !should_pull(self, PullFamily::Query) {
            check_traditional_compatible(&traditional_query_options(open))?;
            let instances = self.exec_query(query_language, query, namespace)?;
            return Ok(QueryResult {
                query_result_class: None,
                instances: instances.into_iter(),
            });
        }

        let opened = match self.open_query_instances(
            query_language,
            query,
            namespace,
            return_query_result_class,
            open,
        ) {
            Ok(opened) => {
                self.pull_caps
                    .commit(PullFamily::Query, PullCapability::Supported);
                opened
            }
            Err(error) if fallback_applies(self, PullFamily::Query, &error) => {
                debug!("OpenQueryInstances rejected as unsupported; falling back to ExecQuery");
                self.pull_caps
                    .commit(PullFamily::Query, PullCapability::Unsupported);
                check_traditional_compatible(&traditional_query_options(open))?;
                let instances = self.exec_query(query_language, query, namespace)?;
                return Ok(QueryResult {
                    query_result_class: None,
                    instances: instances.into_iter(),
                });
            }
            Err(error) => return Err(error),
        };

        let mut instances = opened.instances;
        let mut context = opened.context;
        while let Some(current) = context {
            match self.pull_instances(&current, open.max_object_count) {
                Ok(page) => {
                    instances.extend(page.instances);
                    context = page.context;
                }
                Err(error) => {
                    if let Err(close_error) = self.close_enumeration(&current) {
                        warn!(
                            "failed to close query enumeration {} after pull failure: {close_error}",
                            current.context()
                        );
                    }
                    return Err(error);
                }
            }
        }
        Ok(QueryResult {
            query_result_class: opened.query_result_class,
            instances: instances.into_iter(),
        })
    }
}

/// The query text itself is carried by both planes; only ContinueOnError
/// has no traditional equivalent.
fn traditional_query_options(open: &OpenOptions) -> OpenOptions {
    OpenOptions {
        filter_query: None,
        filter_query_language: None,
        ..open.clone()
    }
}
