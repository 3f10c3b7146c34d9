use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::cim::{
    CimArray, CimClass, CimInstance, CimMethod, CimObjectPath, CimParameter, CimProperty,
    CimQualifier, CimQualifierDeclaration, CimType, CimValue, EmbeddedObjectKind,
};
use crate::err::{BuildError, BuildResult, ValueError};

/// Thin adapter over the quick-xml event writer; keeps the element-writing
/// code below free of event plumbing.
pub(crate) struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        XmlWriter {
            inner: Writer::new(Vec::new()),
        }
    }

    fn write(&mut self, event: Event<'_>) -> BuildResult<()> {
        self.inner
            .write_event(event)
            .map_err(|e| BuildError::Write {
                message: e.to_string(),
            })
    }

    pub fn declaration(&mut self) -> BuildResult<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
    }

    pub fn start(&mut self, tag: &str) -> BuildResult<()> {
        self.write(Event::Start(BytesStart::new(tag)))
    }

    pub fn start_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) -> BuildResult<()> {
        let mut start = BytesStart::new(tag);
        for (key, value) in attrs {
            start.push_attribute((*key, *value));
        }
        self.write(Event::Start(start))
    }

    pub fn empty(&mut self, tag: &str) -> BuildResult<()> {
        self.write(Event::Empty(BytesStart::new(tag)))
    }

    pub fn empty_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) -> BuildResult<()> {
        let mut start = BytesStart::new(tag);
        for (key, value) in attrs {
            start.push_attribute((*key, *value));
        }
        self.write(Event::Empty(start))
    }

    pub fn end(&mut self, tag: &str) -> BuildResult<()> {
        self.write(Event::End(BytesEnd::new(tag)))
    }

    pub fn text(&mut self, text: &str) -> BuildResult<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

/// CIM-XML can escape markup characters but has no representation at all
/// for most control characters; values carrying them are rejected rather
/// than silently substituted.
pub(crate) fn check_cim_string(s: &str) -> Result<(), ValueError> {
    for c in s.chars() {
        let forbidden = (c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r'))
            || matches!(c, '\u{FFFE}' | '\u{FFFF}');
        if forbidden {
            return Err(ValueError::ForbiddenChar {
                codepoint: c as u32,
            });
        }
    }
    Ok(())
}

fn bool_text(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}

/// `VALUE` for scalars, `VALUE.ARRAY`/`VALUE.REFARRAY` for arrays,
/// `VALUE.REFERENCE` for references.
pub(crate) fn write_value(w: &mut XmlWriter, value: &CimValue) -> BuildResult<()> {
    match value {
        CimValue::Array(arr) => write_value_array(w, arr),
        CimValue::Reference(path) => write_value_reference(w, path),
        CimValue::Instance(inst) => {
            let embedded = embedded_instance_text(inst)?;
            w.start("VALUE")?;
            w.text(&embedded)?;
            w.end("VALUE")
        }
        CimValue::Class(class) => {
            let embedded = embedded_class_text(class)?;
            w.start("VALUE")?;
            w.text(&embedded)?;
            w.end("VALUE")
        }
        scalar => {
            let text = scalar.to_text()?;
            check_cim_string(&text)?;
            w.start("VALUE")?;
            w.text(&text)?;
            w.end("VALUE")
        }
    }
}

/// Serialize an instance to the string form used for embedded-object
/// values.
pub(crate) fn embedded_instance_text(instance: &CimInstance) -> BuildResult<String> {
    let mut w = XmlWriter::new();
    write_instance(&mut w, instance)?;
    String::from_utf8(w.into_bytes()).map_err(|e| BuildError::Write {
        message: e.to_string(),
    })
}

pub(crate) fn embedded_class_text(class: &CimClass) -> BuildResult<String> {
    let mut w = XmlWriter::new();
    write_class(&mut w, class)?;
    String::from_utf8(w.into_bytes()).map_err(|e| BuildError::Write {
        message: e.to_string(),
    })
}

pub(crate) fn write_value_array(w: &mut XmlWriter, arr: &CimArray) -> BuildResult<()> {
    if arr.element_type() == CimType::Reference {
        return write_value_refarray(w, arr);
    }
    w.start("VALUE.ARRAY")?;
    for element in arr.elements() {
        match element {
            Some(value) => write_value(w, value)?,
            None => w.empty("VALUE.NULL")?,
        }
    }
    w.end("VALUE.ARRAY")
}

fn write_value_refarray(w: &mut XmlWriter, arr: &CimArray) -> BuildResult<()> {
    w.start("VALUE.REFARRAY")?;
    for element in arr.elements() {
        match element {
            Some(CimValue::Reference(path)) => write_value_reference(w, path)?,
            Some(_) => unreachable!("CimArray enforces element homogeneity"),
            None => w.empty("VALUE.NULL")?,
        }
    }
    w.end("VALUE.REFARRAY")
}

/// The wrapped path form depends on how much the path carries: host and
/// namespace select the `*PATH` productions, key bindings select the
/// instance-side ones.
pub(crate) fn write_value_reference(w: &mut XmlWriter, path: &CimObjectPath) -> BuildResult<()> {
    w.start("VALUE.REFERENCE")?;
    match (path.host(), path.namespace(), path.is_instance_path()) {
        (Some(_), Some(_), true) => write_instancepath(w, path)?,
        (None, Some(ns), true) => write_localinstancepath(w, ns, path)?,
        (_, None, true) => write_instancename(w, path)?,
        (Some(_), Some(_), false) => write_classpath(w, path)?,
        (None, Some(ns), false) => write_localclasspath(w, ns, path.classname())?,
        (_, None, false) => write_classname(w, path.classname())?,
    }
    w.end("VALUE.REFERENCE")
}

pub(crate) fn write_localnamespacepath(w: &mut XmlWriter, namespace: &str) -> BuildResult<()> {
    w.start("LOCALNAMESPACEPATH")?;
    for part in namespace.split('/').filter(|p| !p.is_empty()) {
        w.empty_attrs("NAMESPACE", &[("NAME", part)])?;
    }
    w.end("LOCALNAMESPACEPATH")
}

fn write_namespacepath(w: &mut XmlWriter, host: &str, namespace: &str) -> BuildResult<()> {
    w.start("NAMESPACEPATH")?;
    w.start("HOST")?;
    w.text(host)?;
    w.end("HOST")?;
    write_localnamespacepath(w, namespace)?;
    w.end("NAMESPACEPATH")
}

fn write_instancepath(w: &mut XmlWriter, path: &CimObjectPath) -> BuildResult<()> {
    w.start("INSTANCEPATH")?;
    write_namespacepath(w, path.host().unwrap_or(""), path.namespace().unwrap_or(""))?;
    write_instancename(w, path)?;
    w.end("INSTANCEPATH")
}

pub(crate) fn write_localinstancepath(
    w: &mut XmlWriter,
    namespace: &str,
    path: &CimObjectPath,
) -> BuildResult<()> {
    w.start("LOCALINSTANCEPATH")?;
    write_localnamespacepath(w, namespace)?;
    write_instancename(w, path)?;
    w.end("LOCALINSTANCEPATH")
}

fn write_classpath(w: &mut XmlWriter, path: &CimObjectPath) -> BuildResult<()> {
    w.start("CLASSPATH")?;
    write_namespacepath(w, path.host().unwrap_or(""), path.namespace().unwrap_or(""))?;
    write_classname(w, path.classname())?;
    w.end("CLASSPATH")
}

pub(crate) fn write_localclasspath(
    w: &mut XmlWriter,
    namespace: &str,
    classname: &str,
) -> BuildResult<()> {
    w.start("LOCALCLASSPATH")?;
    write_localnamespacepath(w, namespace)?;
    write_classname(w, classname)?;
    w.end("LOCALCLASSPATH")
}

pub(crate) fn write_classname(w: &mut XmlWriter, name: &str) -> BuildResult<()> {
    w.empty_attrs("CLASSNAME", &[("NAME", name)])
}

fn keyvalue_valuetype(ty: CimType) -> &'static str {
    if ty == CimType::Boolean {
        "boolean"
    } else if ty.is_integer() || ty.is_real() {
        "numeric"
    } else {
        "string"
    }
}

pub(crate) fn write_instancename(w: &mut XmlWriter, path: &CimObjectPath) -> BuildResult<()> {
    w.start_attrs("INSTANCENAME", &[("CLASSNAME", path.classname())])?;
    for (name, value) in path.keybindings().iter() {
        w.start_attrs("KEYBINDING", &[("NAME", name)])?;
        match value {
            CimValue::Reference(ref_path) => write_value_reference(w, ref_path)?,
            scalar => {
                let ty = scalar.cim_type();
                let text = scalar.to_text()?;
                check_cim_string(&text)?;
                w.start_attrs(
                    "KEYVALUE",
                    &[("VALUETYPE", keyvalue_valuetype(ty)), ("TYPE", ty.name())],
                )?;
                w.text(&text)?;
                w.end("KEYVALUE")?;
            }
        }
        w.end("KEYBINDING")?;
    }
    w.end("INSTANCENAME")
}

pub(crate) fn write_qualifier(w: &mut XmlWriter, q: &CimQualifier) -> BuildResult<()> {
    let mut attrs: Vec<(&str, String)> = vec![
        ("NAME", q.name().to_owned()),
        ("TYPE", q.cim_type().name().to_owned()),
    ];
    if let Some(p) = q.propagated() {
        attrs.push(("PROPAGATED", bool_text(p).to_owned()));
    }
    push_flavor_attrs(
        &mut attrs,
        q.overridable(),
        q.tosubclass(),
        q.toinstance(),
        q.translatable(),
    );
    let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    match q.value() {
        Some(value) => {
            w.start_attrs("QUALIFIER", &borrowed)?;
            write_value(w, value)?;
            w.end("QUALIFIER")
        }
        None => w.empty_attrs("QUALIFIER", &borrowed),
    }
}

fn push_flavor_attrs(
    attrs: &mut Vec<(&str, String)>,
    overridable: Option<bool>,
    tosubclass: Option<bool>,
    toinstance: Option<bool>,
    translatable: Option<bool>,
) {
    if let Some(v) = overridable {
        attrs.push(("OVERRIDABLE", bool_text(v).to_owned()));
    }
    if let Some(v) = tosubclass {
        attrs.push(("TOSUBCLASS", bool_text(v).to_owned()));
    }
    if let Some(v) = toinstance {
        attrs.push(("TOINSTANCE", bool_text(v).to_owned()));
    }
    if let Some(v) = translatable {
        attrs.push(("TRANSLATABLE", bool_text(v).to_owned()));
    }
}

fn write_qualifiers(
    w: &mut XmlWriter,
    qualifiers: &crate::cim::NameMap<CimQualifier>,
) -> BuildResult<()> {
    for q in qualifiers.values() {
        write_qualifier(w, q)?;
    }
    Ok(())
}

pub(crate) fn write_qualifier_declaration(
    w: &mut XmlWriter,
    decl: &CimQualifierDeclaration,
) -> BuildResult<()> {
    let mut attrs: Vec<(&str, String)> = vec![
        ("NAME", decl.name().to_owned()),
        ("TYPE", decl.cim_type().name().to_owned()),
    ];
    if decl.is_array() {
        attrs.push(("ISARRAY", "true".to_owned()));
        if let Some(size) = decl.array_size() {
            attrs.push(("ARRAYSIZE", size.to_string()));
        }
    }
    push_flavor_attrs(
        &mut attrs,
        decl.overridable(),
        decl.tosubclass(),
        decl.toinstance(),
        decl.translatable(),
    );
    let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    w.start_attrs("QUALIFIER.DECLARATION", &borrowed)?;

    let scopes = decl.scopes();
    let scope_attrs: [(&str, bool); 7] = [
        ("CLASS", scopes.class || scopes.any),
        ("ASSOCIATION", scopes.association || scopes.any),
        ("REFERENCE", scopes.reference || scopes.any),
        ("PROPERTY", scopes.property || scopes.any),
        ("METHOD", scopes.method || scopes.any),
        ("PARAMETER", scopes.parameter || scopes.any),
        ("INDICATION", scopes.indication || scopes.any),
    ];
    if scope_attrs.iter().any(|(_, set)| *set) {
        let rendered: Vec<(&str, &str)> = scope_attrs
            .iter()
            .map(|(name, set)| (*name, bool_text(*set)))
            .collect();
        w.empty_attrs("SCOPE", &rendered)?;
    }
    if let Some(value) = decl.value() {
        write_value(w, value)?;
    }
    w.end("QUALIFIER.DECLARATION")
}

pub(crate) fn write_property(w: &mut XmlWriter, prop: &CimProperty) -> BuildResult<()> {
    if prop.cim_type() == CimType::Reference && !prop.is_array() {
        let mut attrs: Vec<(&str, String)> = vec![("NAME", prop.name().to_owned())];
        if let Some(rc) = prop.reference_class() {
            attrs.push(("REFERENCECLASS", rc.to_owned()));
        }
        push_declaration_attrs(&mut attrs, prop);
        let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        w.start_attrs("PROPERTY.REFERENCE", &borrowed)?;
        write_qualifiers(w, prop.qualifiers())?;
        if let Some(CimValue::Reference(path)) = prop.value() {
            write_value_reference(w, path)?;
        }
        return w.end("PROPERTY.REFERENCE");
    }

    let tag = if prop.is_array() {
        "PROPERTY.ARRAY"
    } else {
        "PROPERTY"
    };
    let mut attrs: Vec<(&str, String)> = vec![
        ("NAME", prop.name().to_owned()),
        ("TYPE", prop.cim_type().name().to_owned()),
    ];
    if prop.is_array() {
        if let Some(size) = prop.array_size() {
            attrs.push(("ARRAYSIZE", size.to_string()));
        }
    }
    push_declaration_attrs(&mut attrs, prop);
    if let Some(kind) = prop.embedded_object() {
        let marker = match kind {
            EmbeddedObjectKind::Instance => "instance",
            EmbeddedObjectKind::Object => "object",
        };
        attrs.push(("EMBEDDEDOBJECT", marker.to_owned()));
    }
    let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    w.start_attrs(tag, &borrowed)?;
    write_qualifiers(w, prop.qualifiers())?;
    if let Some(value) = prop.value() {
        write_value(w, value)?;
    }
    w.end(tag)
}

fn push_declaration_attrs(attrs: &mut Vec<(&str, String)>, prop: &CimProperty) {
    if let Some(origin) = prop.class_origin() {
        attrs.push(("CLASSORIGIN", origin.to_owned()));
    }
    if let Some(propagated) = prop.propagated() {
        attrs.push(("PROPAGATED", bool_text(propagated).to_owned()));
    }
}

pub(crate) fn write_instance(w: &mut XmlWriter, instance: &CimInstance) -> BuildResult<()> {
    w.start_attrs("INSTANCE", &[("CLASSNAME", instance.classname())])?;
    write_qualifiers(w, instance.qualifiers())?;
    for prop in instance.properties().values() {
        write_property(w, prop)?;
    }
    w.end("INSTANCE")
}

/// `VALUE.NAMEDINSTANCE` pairs an instance with its (local) name; used by
/// ModifyInstance requests.
pub(crate) fn write_value_namedinstance(
    w: &mut XmlWriter,
    instance: &CimInstance,
    path: &CimObjectPath,
) -> BuildResult<()> {
    w.start("VALUE.NAMEDINSTANCE")?;
    write_instancename(w, path)?;
    write_instance(w, instance)?;
    w.end("VALUE.NAMEDINSTANCE")
}

pub(crate) fn write_parameter(w: &mut XmlWriter, param: &CimParameter) -> BuildResult<()> {
    let reference = param.cim_type() == CimType::Reference;
    let tag = match (reference, param.is_array()) {
        (true, true) => "PARAMETER.REFARRAY",
        (true, false) => "PARAMETER.REFERENCE",
        (false, true) => "PARAMETER.ARRAY",
        (false, false) => "PARAMETER",
    };
    let mut attrs: Vec<(&str, String)> = vec![("NAME", param.name().to_owned())];
    if reference {
        if let Some(rc) = param.reference_class() {
            attrs.push(("REFERENCECLASS", rc.to_owned()));
        }
    } else {
        attrs.push(("TYPE", param.cim_type().name().to_owned()));
    }
    if param.is_array() {
        if let Some(size) = param.array_size() {
            attrs.push(("ARRAYSIZE", size.to_string()));
        }
    }
    let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    if param.qualifiers().is_empty() {
        w.empty_attrs(tag, &borrowed)
    } else {
        w.start_attrs(tag, &borrowed)?;
        write_qualifiers(w, param.qualifiers())?;
        w.end(tag)
    }
}

pub(crate) fn write_method(w: &mut XmlWriter, method: &CimMethod) -> BuildResult<()> {
    let mut attrs: Vec<(&str, String)> = vec![("NAME", method.name().to_owned())];
    if let Some(ty) = method.return_type() {
        attrs.push(("TYPE", ty.name().to_owned()));
    }
    if let Some(origin) = method.class_origin() {
        attrs.push(("CLASSORIGIN", origin.to_owned()));
    }
    if let Some(propagated) = method.propagated() {
        attrs.push(("PROPAGATED", bool_text(propagated).to_owned()));
    }
    let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    w.start_attrs("METHOD", &borrowed)?;
    write_qualifiers(w, method.qualifiers())?;
    for param in method.parameters().values() {
        write_parameter(w, param)?;
    }
    w.end("METHOD")
}

pub(crate) fn write_class(w: &mut XmlWriter, class: &CimClass) -> BuildResult<()> {
    let mut attrs: Vec<(&str, String)> = vec![("NAME", class.classname().to_owned())];
    if let Some(superclass) = class.superclass() {
        attrs.push(("SUPERCLASS", superclass.to_owned()));
    }
    let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    w.start_attrs("CLASS", &borrowed)?;
    write_qualifiers(w, class.qualifiers())?;
    for prop in class.properties().values() {
        write_property(w, prop)?;
    }
    for method in class.methods().values() {
        write_method(w, method)?;
    }
    w.end("CLASS")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cim::CimProperty;
    use pretty_assertions::assert_eq;

    fn render(f: impl FnOnce(&mut XmlWriter) -> BuildResult<()>) -> String {
        let mut w = XmlWriter::new();
        f(&mut w).unwrap();
        String::from_utf8(w.into_bytes()).unwrap()
    }

    #[test]
    fn scalar_value_is_escaped_text() {
        let rendered = render(|w| write_value(w, &CimValue::String("a<b&c".into())));
        assert_eq!(rendered, "<VALUE>a&lt;b&amp;c</VALUE>");
    }

    #[test]
    fn control_characters_are_rejected_not_substituted() {
        let mut w = XmlWriter::new();
        let err = write_value(&mut w, &CimValue::String("a\u{0}b".into())).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Value(ValueError::ForbiddenChar { codepoint: 0 })
        ));
    }

    #[test]
    fn arrays_use_value_array_with_nulls() {
        let arr = CimArray::with_nulls(
            CimType::Uint8,
            vec![Some(CimValue::Uint8(1)), None, Some(CimValue::Uint8(3))],
        )
        .unwrap();
        let rendered = render(|w| write_value_array(w, &arr));
        assert_eq!(
            rendered,
            "<VALUE.ARRAY><VALUE>1</VALUE><VALUE.NULL/><VALUE>3</VALUE></VALUE.ARRAY>"
        );
    }

    #[test]
    fn reference_arrays_use_refarray() {
        let arr = CimArray::new(
            CimType::Reference,
            vec![CimValue::Reference(CimObjectPath::new("CIM_Foo"))],
        )
        .unwrap();
        let rendered = render(|w| write_value_array(w, &arr));
        assert_eq!(
            rendered,
            "<VALUE.REFARRAY><VALUE.REFERENCE><CLASSNAME NAME=\"CIM_Foo\"/></VALUE.REFERENCE></VALUE.REFARRAY>"
        );
    }

    #[test]
    fn reference_form_tracks_path_contents() {
        let local = CimObjectPath::new("CIM_Foo")
            .with_namespace("root/cimv2")
            .with_keybinding("Name", CimValue::String("a".into()));
        let rendered = render(|w| write_value_reference(w, &local));
        assert!(rendered.starts_with("<VALUE.REFERENCE><LOCALINSTANCEPATH>"));
        assert!(rendered.contains("<NAMESPACE NAME=\"root\"/><NAMESPACE NAME=\"cimv2\"/>"));
        assert!(rendered.contains("KEYVALUE VALUETYPE=\"string\" TYPE=\"string\""));

        let bare = CimObjectPath::new("CIM_Foo");
        let rendered = render(|w| write_value_reference(w, &bare));
        assert_eq!(
            rendered,
            "<VALUE.REFERENCE><CLASSNAME NAME=\"CIM_Foo\"/></VALUE.REFERENCE>"
        );
    }

    #[test]
    fn instancename_renders_typed_keybindings() {
        let path = CimObjectPath::new("CIM_Foo")
            .with_keybinding("Index", CimValue::Uint32(7))
            .with_keybinding("Enabled", CimValue::Boolean(true));
        let rendered = render(|w| write_instancename(w, &path));
        assert_eq!(
            rendered,
            "<INSTANCENAME CLASSNAME=\"CIM_Foo\">\
             <KEYBINDING NAME=\"Index\"><KEYVALUE VALUETYPE=\"numeric\" TYPE=\"uint32\">7</KEYVALUE></KEYBINDING>\
             <KEYBINDING NAME=\"Enabled\"><KEYVALUE VALUETYPE=\"boolean\" TYPE=\"boolean\">true</KEYVALUE></KEYBINDING>\
             </INSTANCENAME>"
        );
    }

    #[test]
    fn embedded_instance_is_escaped_into_a_string_value() {
        let inner = CimInstance::new("CIM_Inner").with_property(CimProperty::string("Name", "x"));
        let rendered = render(|w| write_value(w, &CimValue::Instance(Box::new(inner))));
        // The nested INSTANCE document must arrive escaped, not as markup.
        assert!(rendered.starts_with("<VALUE>&lt;INSTANCE"));
        assert!(!rendered.contains("<INSTANCE "));
    }

    #[test]
    fn property_forms_follow_type_and_arrayness() {
        let scalar = CimProperty::uint32("Index", 7);
        assert!(render(|w| write_property(w, &scalar)).starts_with("<PROPERTY NAME=\"Index\" TYPE=\"uint32\">"));

        let reference = CimProperty::reference("Target", CimObjectPath::new("CIM_Bar"));
        assert!(render(|w| write_property(w, &reference))
            .starts_with("<PROPERTY.REFERENCE NAME=\"Target\">"));

        let array = CimProperty::new("List", CimType::Uint8).with_value(CimValue::Array(
            CimArray::new(CimType::Uint8, vec![CimValue::Uint8(1)]).unwrap(),
        ));
        assert!(render(|w| write_property(w, &array))
            .starts_with("<PROPERTY.ARRAY NAME=\"List\" TYPE=\"uint8\">"));
    }

    #[test]
    fn qualifier_declaration_includes_scope_when_set() {
        let decl = CimQualifierDeclaration::new("Key", CimType::Boolean)
            .with_value(CimValue::Boolean(false))
            .with_scopes(crate::cim::QualifierScopes {
                property: true,
                reference: true,
                ..Default::default()
            });
        let rendered = render(|w| write_qualifier_declaration(w, &decl));
        assert!(rendered.contains("<SCOPE CLASS=\"false\" ASSOCIATION=\"false\" REFERENCE=\"true\" PROPERTY=\"true\""));
        assert!(rendered.contains("<VALUE>false</VALUE>"));
    }
}
