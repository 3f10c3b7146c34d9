use crate::cim::namemap::NameMap;
use crate::cim::path::CimObjectPath;
use crate::cim::qualifier::CimQualifier;
use crate::cim::types::CimType;
use crate::cim::value::CimValue;
use crate::err::{ParameterError, ParameterResult};

/// Marks a string-typed value as carrying an embedded CIM object, per the
/// `EmbeddedObject`/`EmbeddedInstance` qualifier convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedObjectKind {
    /// `EMBEDDEDOBJECT="object"`: an embedded class or instance.
    Object,
    /// `EMBEDDEDOBJECT="instance"`: an embedded instance.
    Instance,
}

/// A property declaration or instance property.
#[derive(Debug, Clone, PartialEq)]
pub struct CimProperty {
    name: String,
    ty: CimType,
    value: Option<CimValue>,
    is_array: bool,
    array_size: Option<u32>,
    reference_class: Option<String>,
    class_origin: Option<String>,
    propagated: Option<bool>,
    embedded_object: Option<EmbeddedObjectKind>,
    qualifiers: NameMap<CimQualifier>,
}

impl CimProperty {
    pub fn new(name: impl Into<String>, ty: CimType) -> Self {
        CimProperty {
            name: name.into(),
            ty,
            value: None,
            is_array: false,
            array_size: None,
            reference_class: None,
            class_origin: None,
            propagated: None,
            embedded_object: None,
            qualifiers: NameMap::new(),
        }
    }

    pub fn with_value(mut self, value: CimValue) -> Self {
        self.is_array = value.is_array();
        self.value = Some(value);
        self
    }

    pub fn array(mut self, array_size: Option<u32>) -> Self {
        self.is_array = true;
        self.array_size = array_size;
        self
    }

    pub fn with_qualifier(mut self, qualifier: CimQualifier) -> Self {
        self.qualifiers.insert(qualifier.name().to_owned(), qualifier);
        self
    }

    /// Shorthand for a string property with a value.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        CimProperty::new(name, CimType::String).with_value(CimValue::String(value.into()))
    }

    /// Shorthand for a boolean property with a value.
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        CimProperty::new(name, CimType::Boolean).with_value(CimValue::Boolean(value))
    }

    /// Shorthand for a uint32 property with a value.
    pub fn uint32(name: impl Into<String>, value: u32) -> Self {
        CimProperty::new(name, CimType::Uint32).with_value(CimValue::Uint32(value))
    }

    /// Shorthand for a reference property with a value.
    pub fn reference(name: impl Into<String>, value: CimObjectPath) -> Self {
        CimProperty::new(name, CimType::Reference).with_value(CimValue::Reference(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cim_type(&self) -> CimType {
        self.ty
    }

    pub fn value(&self) -> Option<&CimValue> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: Option<CimValue>) {
        self.value = value;
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn array_size(&self) -> Option<u32> {
        self.array_size
    }

    /// For reference-typed properties, the declared class of the referenced
    /// object.
    pub fn reference_class(&self) -> Option<&str> {
        self.reference_class.as_deref()
    }

    pub fn set_reference_class(&mut self, class: Option<String>) {
        self.reference_class = class;
    }

    pub fn class_origin(&self) -> Option<&str> {
        self.class_origin.as_deref()
    }

    pub fn set_class_origin(&mut self, origin: Option<String>) {
        self.class_origin = origin;
    }

    pub fn propagated(&self) -> Option<bool> {
        self.propagated
    }

    pub fn set_propagated(&mut self, propagated: Option<bool>) {
        self.propagated = propagated;
    }

    pub fn embedded_object(&self) -> Option<EmbeddedObjectKind> {
        self.embedded_object
    }

    pub fn set_embedded_object(&mut self, kind: Option<EmbeddedObjectKind>) {
        self.embedded_object = kind;
    }

    pub fn qualifiers(&self) -> &NameMap<CimQualifier> {
        &self.qualifiers
    }

    pub fn qualifiers_mut(&mut self) -> &mut NameMap<CimQualifier> {
        &mut self.qualifiers
    }
}

/// A CIM instance: named, typed property values, optionally anchored at a
/// path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CimInstance {
    classname: String,
    properties: NameMap<CimProperty>,
    qualifiers: NameMap<CimQualifier>,
    path: Option<CimObjectPath>,
}

impl CimInstance {
    pub fn new(classname: impl Into<String>) -> Self {
        CimInstance {
            classname: classname.into(),
            properties: NameMap::new(),
            qualifiers: NameMap::new(),
            path: None,
        }
    }

    pub fn with_property(mut self, property: CimProperty) -> Self {
        self.properties.insert(property.name().to_owned(), property);
        self
    }

    pub fn with_qualifier(mut self, qualifier: CimQualifier) -> Self {
        self.qualifiers.insert(qualifier.name().to_owned(), qualifier);
        self
    }

    /// Builder-style path setter; see [`CimInstance::set_path`] for the
    /// class-name invariant.
    pub fn with_path(mut self, path: CimObjectPath) -> ParameterResult<Self> {
        self.set_path(path)?;
        Ok(self)
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    pub fn properties(&self) -> &NameMap<CimProperty> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut NameMap<CimProperty> {
        &mut self.properties
    }

    pub fn property(&self, name: &str) -> Option<&CimProperty> {
        self.properties.get(name)
    }

    /// Convenience accessor for a property's value.
    pub fn property_value(&self, name: &str) -> Option<&CimValue> {
        self.properties.get(name).and_then(|p| p.value())
    }

    pub fn add_property(&mut self, property: CimProperty) {
        self.properties.insert(property.name().to_owned(), property);
    }

    pub fn qualifiers(&self) -> &NameMap<CimQualifier> {
        &self.qualifiers
    }

    pub fn qualifiers_mut(&mut self) -> &mut NameMap<CimQualifier> {
        &mut self.qualifiers
    }

    pub fn path(&self) -> Option<&CimObjectPath> {
        self.path.as_ref()
    }

    pub fn path_mut(&mut self) -> Option<&mut CimObjectPath> {
        self.path.as_mut()
    }

    /// Attach a path. The path's class must match the instance's class
    /// (case-insensitively).
    pub fn set_path(&mut self, path: CimObjectPath) -> ParameterResult<()> {
        if !path.classname().eq_ignore_ascii_case(&self.classname) {
            return Err(ParameterError::ClassNameMismatch {
                path_class: path.classname().to_owned(),
                instance_class: self.classname.clone(),
            });
        }
        self.path = Some(path);
        Ok(())
    }

    pub fn take_path(&mut self) -> Option<CimObjectPath> {
        self.path.take()
    }
}

/// A parameter declaration within a method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct CimParameter {
    name: String,
    ty: CimType,
    is_array: bool,
    array_size: Option<u32>,
    reference_class: Option<String>,
    qualifiers: NameMap<CimQualifier>,
}

impl CimParameter {
    pub fn new(name: impl Into<String>, ty: CimType) -> Self {
        CimParameter {
            name: name.into(),
            ty,
            is_array: false,
            array_size: None,
            reference_class: None,
            qualifiers: NameMap::new(),
        }
    }

    pub fn array(mut self, array_size: Option<u32>) -> Self {
        self.is_array = true;
        self.array_size = array_size;
        self
    }

    pub fn with_reference_class(mut self, class: impl Into<String>) -> Self {
        self.reference_class = Some(class.into());
        self
    }

    pub fn with_qualifier(mut self, qualifier: CimQualifier) -> Self {
        self.qualifiers.insert(qualifier.name().to_owned(), qualifier);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cim_type(&self) -> CimType {
        self.ty
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn array_size(&self) -> Option<u32> {
        self.array_size
    }

    pub fn reference_class(&self) -> Option<&str> {
        self.reference_class.as_deref()
    }

    pub fn qualifiers(&self) -> &NameMap<CimQualifier> {
        &self.qualifiers
    }

    pub fn qualifiers_mut(&mut self) -> &mut NameMap<CimQualifier> {
        &mut self.qualifiers
    }
}

/// A method declaration within a class.
#[derive(Debug, Clone, PartialEq)]
pub struct CimMethod {
    name: String,
    return_type: Option<CimType>,
    parameters: NameMap<CimParameter>,
    class_origin: Option<String>,
    propagated: Option<bool>,
    qualifiers: NameMap<CimQualifier>,
}

impl CimMethod {
    pub fn new(name: impl Into<String>, return_type: Option<CimType>) -> Self {
        CimMethod {
            name: name.into(),
            return_type,
            parameters: NameMap::new(),
            class_origin: None,
            propagated: None,
            qualifiers: NameMap::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: CimParameter) -> Self {
        self.parameters.insert(parameter.name().to_owned(), parameter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> Option<CimType> {
        self.return_type
    }

    pub fn parameters(&self) -> &NameMap<CimParameter> {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut NameMap<CimParameter> {
        &mut self.parameters
    }

    pub fn class_origin(&self) -> Option<&str> {
        self.class_origin.as_deref()
    }

    pub fn set_class_origin(&mut self, origin: Option<String>) {
        self.class_origin = origin;
    }

    pub fn propagated(&self) -> Option<bool> {
        self.propagated
    }

    pub fn set_propagated(&mut self, propagated: Option<bool>) {
        self.propagated = propagated;
    }

    pub fn qualifiers(&self) -> &NameMap<CimQualifier> {
        &self.qualifiers
    }

    pub fn qualifiers_mut(&mut self) -> &mut NameMap<CimQualifier> {
        &mut self.qualifiers
    }
}

/// A CIM class declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CimClass {
    classname: String,
    superclass: Option<String>,
    properties: NameMap<CimProperty>,
    methods: NameMap<CimMethod>,
    qualifiers: NameMap<CimQualifier>,
    path: Option<CimObjectPath>,
}

impl CimClass {
    pub fn new(classname: impl Into<String>) -> Self {
        CimClass {
            classname: classname.into(),
            superclass: None,
            properties: NameMap::new(),
            methods: NameMap::new(),
            qualifiers: NameMap::new(),
            path: None,
        }
    }

    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn with_property(mut self, property: CimProperty) -> Self {
        self.properties.insert(property.name().to_owned(), property);
        self
    }

    pub fn with_method(mut self, method: CimMethod) -> Self {
        self.methods.insert(method.name().to_owned(), method);
        self
    }

    pub fn with_qualifier(mut self, qualifier: CimQualifier) -> Self {
        self.qualifiers.insert(qualifier.name().to_owned(), qualifier);
        self
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    pub fn set_superclass(&mut self, superclass: Option<String>) {
        self.superclass = superclass;
    }

    pub fn properties(&self) -> &NameMap<CimProperty> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut NameMap<CimProperty> {
        &mut self.properties
    }

    pub fn methods(&self) -> &NameMap<CimMethod> {
        &self.methods
    }

    pub fn methods_mut(&mut self) -> &mut NameMap<CimMethod> {
        &mut self.methods
    }

    pub fn qualifiers(&self) -> &NameMap<CimQualifier> {
        &self.qualifiers
    }

    pub fn qualifiers_mut(&mut self) -> &mut NameMap<CimQualifier> {
        &mut self.qualifiers
    }

    /// Class paths carry namespace and host only, never key bindings.
    pub fn path(&self) -> Option<&CimObjectPath> {
        self.path.as_ref()
    }

    pub fn path_mut(&mut self) -> Option<&mut CimObjectPath> {
        self.path.as_mut()
    }

    pub fn set_path(&mut self, path: Option<CimObjectPath>) {
        self.path = path;
    }
}

/// Either an instance or a class, as produced by association and query
/// operations whose wire shape may carry both.
#[derive(Debug, Clone, PartialEq)]
pub enum CimObject {
    Instance(CimInstance),
    Class(CimClass),
}

impl CimObject {
    pub fn path(&self) -> Option<&CimObjectPath> {
        match self {
            CimObject::Instance(i) => i.path(),
            CimObject::Class(c) => c.path(),
        }
    }

    pub fn as_instance(&self) -> Option<&CimInstance> {
        match self {
            CimObject::Instance(i) => Some(i),
            CimObject::Class(_) => None,
        }
    }

    pub fn into_instance(self) -> Option<CimInstance> {
        match self {
            CimObject::Instance(i) => Some(i),
            CimObject::Class(_) => None,
        }
    }
}
