use crate::cim::types::CimType;
use crate::cim::value::CimValue;

/// A qualifier attached to a class, property, method or parameter.
///
/// The four flavor flags are tri-state: `None` means the flavor was not
/// specified and the DSP0004 default applies (overridable and tosubclass
/// default to true, toinstance and translatable to false). Because each
/// mutually-exclusive flavor pair (`EnableOverride`/`DisableOverride`,
/// `ToSubclass`/`Restricted`) is one boolean, conflicting settings are
/// unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub struct CimQualifier {
    name: String,
    ty: CimType,
    value: Option<CimValue>,
    propagated: Option<bool>,
    overridable: Option<bool>,
    tosubclass: Option<bool>,
    toinstance: Option<bool>,
    translatable: Option<bool>,
}

impl CimQualifier {
    pub fn new(name: impl Into<String>, ty: CimType) -> Self {
        CimQualifier {
            name: name.into(),
            ty,
            value: None,
            propagated: None,
            overridable: None,
            tosubclass: None,
            toinstance: None,
            translatable: None,
        }
    }

    pub fn with_value(mut self, value: CimValue) -> Self {
        self.value = Some(value);
        self
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

    pub fn propagated(&self) -> Option<bool> {
        self.propagated
    }

    pub fn set_propagated(&mut self, propagated: Option<bool>) {
        self.propagated = propagated;
    }

    pub fn overridable(&self) -> Option<bool> {
        self.overridable
    }

    pub fn tosubclass(&self) -> Option<bool> {
        self.tosubclass
    }

    pub fn toinstance(&self) -> Option<bool> {
        self.toinstance
    }

    pub fn translatable(&self) -> Option<bool> {
        self.translatable
    }

    pub fn set_flavors(
        &mut self,
        overridable: Option<bool>,
        tosubclass: Option<bool>,
        toinstance: Option<bool>,
        translatable: Option<bool>,
    ) {
        self.overridable = overridable;
        self.tosubclass = tosubclass;
        self.toinstance = toinstance;
        self.translatable = translatable;
    }

    /// Flavor with the DSP0004 default applied.
    pub fn effective_overridable(&self) -> bool {
        self.overridable.unwrap_or(true)
    }

    pub fn effective_tosubclass(&self) -> bool {
        self.tosubclass.unwrap_or(true)
    }

    pub fn effective_toinstance(&self) -> bool {
        self.toinstance.unwrap_or(false)
    }

    pub fn effective_translatable(&self) -> bool {
        self.translatable.unwrap_or(false)
    }
}

/// The meta-element kinds a qualifier may be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QualifierScopes {
    pub class: bool,
    pub association: bool,
    pub reference: bool,
    pub property: bool,
    pub method: bool,
    pub parameter: bool,
    pub indication: bool,
    pub any: bool,
}

impl QualifierScopes {
    pub fn any_scope() -> Self {
        QualifierScopes {
            any: true,
            ..Default::default()
        }
    }
}

/// A qualifier type declaration, as returned by the qualifier-declaration
/// operations.
#[derive(Debug, Clone, PartialEq)]
pub struct CimQualifierDeclaration {
    name: String,
    ty: CimType,
    value: Option<CimValue>,
    is_array: bool,
    array_size: Option<u32>,
    scopes: QualifierScopes,
    overridable: Option<bool>,
    tosubclass: Option<bool>,
    toinstance: Option<bool>,
    translatable: Option<bool>,
}

impl CimQualifierDeclaration {
    pub fn new(name: impl Into<String>, ty: CimType) -> Self {
        CimQualifierDeclaration {
            name: name.into(),
            ty,
            value: None,
            is_array: false,
            array_size: None,
            scopes: QualifierScopes::default(),
            overridable: None,
            tosubclass: None,
            toinstance: None,
            translatable: None,
        }
    }

    pub fn with_value(mut self, value: CimValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_scopes(mut self, scopes: QualifierScopes) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn array(mut self, array_size: Option<u32>) -> Self {
        self.is_array = true;
        self.array_size = array_size;
        self
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

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn array_size(&self) -> Option<u32> {
        self.array_size
    }

    pub fn scopes(&self) -> &QualifierScopes {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut QualifierScopes {
        &mut self.scopes
    }

    pub fn overridable(&self) -> Option<bool> {
        self.overridable
    }

    pub fn tosubclass(&self) -> Option<bool> {
        self.tosubclass
    }

    pub fn toinstance(&self) -> Option<bool> {
        self.toinstance
    }

    pub fn translatable(&self) -> Option<bool> {
        self.translatable
    }

    pub fn set_flavors(
        &mut self,
        overridable: Option<bool>,
        tosubclass: Option<bool>,
        toinstance: Option<bool>,
        translatable: Option<bool>,
    ) {
        self.overridable = overridable;
        self.tosubclass = tosubclass;
        self.toinstance = toinstance;
        self.translatable = translatable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_defaults_follow_dsp0004() {
        let q = CimQualifier::new("Key", CimType::Boolean).with_value(CimValue::Boolean(true));
        assert!(q.effective_overridable());
        assert!(q.effective_tosubclass());
        assert!(!q.effective_toinstance());
        assert!(!q.effective_translatable());
    }

    #[test]
    fn explicit_flavors_override_defaults() {
        let mut q = CimQualifier::new("Description", CimType::String);
        q.set_flavors(Some(false), None, None, Some(true));
        assert!(!q.effective_overridable());
        assert!(q.effective_translatable());
    }
}
