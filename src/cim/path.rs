use std::fmt;

use crate::cim::namemap::NameMap;
use crate::cim::value::CimValue;

/// Identifies a CIM class or instance, optionally qualified by namespace
/// and host.
///
/// A path with key bindings names an instance; without them it names a
/// class. The host is only ever present when a server supplied it (for
/// example in association results) and is never defaulted locally.
#[derive(Debug, Clone, Default)]
pub struct CimObjectPath {
    classname: String,
    keybindings: NameMap<CimValue>,
    namespace: Option<String>,
    host: Option<String>,
}

fn trim_namespace(ns: &str) -> &str {
    ns.trim_matches('/')
}

impl CimObjectPath {
    pub fn new(classname: impl Into<String>) -> Self {
        CimObjectPath {
            classname: classname.into(),
            keybindings: NameMap::new(),
            namespace: None,
            host: None,
        }
    }

    /// Builder-style namespace setter; leading and trailing slashes are
    /// trimmed.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.set_namespace(Some(namespace.into()));
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Builder-style key binding setter, preserving insertion order.
    pub fn with_keybinding(mut self, name: impl Into<String>, value: impl Into<CimValue>) -> Self {
        self.keybindings.insert(name, value.into());
        self
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn keybindings(&self) -> &NameMap<CimValue> {
        &self.keybindings
    }

    pub fn keybinding(&self, name: &str) -> Option<&CimValue> {
        self.keybindings.get(name)
    }

    pub fn add_keybinding(&mut self, name: impl Into<String>, value: impl Into<CimValue>) {
        self.keybindings.insert(name, value.into());
    }

    pub fn set_namespace(&mut self, namespace: Option<String>) {
        self.namespace = namespace.map(|ns| trim_namespace(&ns).to_owned());
    }

    pub fn set_host(&mut self, host: Option<String>) {
        self.host = host;
    }

    /// Key bindings are what distinguish an instance path from a class path.
    pub fn is_instance_path(&self) -> bool {
        !self.keybindings.is_empty()
    }
}

/// Class, namespace and host names compare case-insensitively; key bindings
/// compare without regard to order.
impl PartialEq for CimObjectPath {
    fn eq(&self, other: &Self) -> bool {
        fn opt_eq_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
        }
        self.classname.eq_ignore_ascii_case(&other.classname)
            && opt_eq_ignore_case(self.namespace(), other.namespace())
            && opt_eq_ignore_case(self.host(), other.host())
            && self.keybindings == other.keybindings
    }
}

fn write_key_value(f: &mut fmt::Formatter<'_>, value: &CimValue) -> fmt::Result {
    match value {
        CimValue::String(s) => {
            write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
        }
        CimValue::Boolean(b) => write!(f, "{b}"),
        CimValue::Reference(path) => {
            let nested = path.to_string();
            write!(
                f,
                "\"{}\"",
                nested.replace('\\', "\\\\").replace('"', "\\\"")
            )
        }
        CimValue::DateTime(dt) => write!(f, "\"{dt}\""),
        other => match other.to_text() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("?"),
        },
    }
}

/// Renders the untyped WBEM path string, e.g.
/// `//cimom.example.com/root/cimv2:CIM_Foo.Name="a",Index=1`.
impl fmt::Display for CimObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.host, &self.namespace) {
            (Some(host), Some(ns)) => write!(f, "//{host}/{ns}:")?,
            (Some(host), None) => write!(f, "//{host}/:")?,
            (None, Some(ns)) => write!(f, "{ns}:")?,
            (None, None) => {}
        }
        f.write_str(&self.classname)?;
        for (i, (name, value)) in self.keybindings.iter().enumerate() {
            f.write_str(if i == 0 { "." } else { "," })?;
            write!(f, "{name}=")?;
            write_key_value(f, value)?;
        }
        Ok(())
    }
}
