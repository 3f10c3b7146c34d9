//! Recursive-descent reduction of response tuple-trees into typed CIM
//! objects, following the DSP0201 element grammar.
//!
//! Every production checks the element it was handed by name and fails
//! with the expected/actual pair on a mismatch; nothing is skipped or
//! guessed. An `ERROR` element short-circuits the whole reduction into a
//! server-status error, even when sibling return data is present.

use log::trace;

use crate::cim::{
    CimArray, CimClass, CimInstance, CimMethod, CimObject, CimObjectPath, CimParameter,
    CimProperty, CimQualifier, CimQualifierDeclaration, CimType, CimValue, EmbeddedObjectKind,
    QualifierScopes,
};
use crate::cimxml::tupletree::TupleTree;
use crate::err::{CimError, ProtocolError, ProtocolResult, ValueError};

/// Either grammar-shape failure or a server-reported error; the dispatcher
/// enriches both with the raw request/reply before surfacing them.
#[derive(Debug)]
pub(crate) enum RspError {
    Protocol(ProtocolError),
    Cim(CimError),
}

impl From<ProtocolError> for RspError {
    fn from(e: ProtocolError) -> Self {
        RspError::Protocol(e)
    }
}

impl From<ValueError> for RspError {
    fn from(e: ValueError) -> Self {
        RspError::Protocol(ProtocolError::Value(e))
    }
}

impl From<CimError> for RspError {
    fn from(e: CimError) -> Self {
        RspError::Cim(e)
    }
}

/// A parsed `PARAMVALUE` output parameter.
#[derive(Debug, Clone)]
pub(crate) struct ParamValue {
    pub name: String,
    pub value: Option<CimValue>,
}

/// The reduced body of an `IMETHODRESPONSE`.
#[derive(Debug)]
pub(crate) struct IMethodResponse {
    /// `None` when the `IRETURNVALUE` element was absent entirely (which
    /// this client tolerates as an empty result); `Some` carries its
    /// children.
    pub return_children: Option<Vec<TupleTree>>,
    pub out_params: Vec<ParamValue>,
}

/// The reduced body of a `METHODRESPONSE` (extrinsic invocation).
#[derive(Debug)]
pub(crate) struct MethodResponse {
    pub return_value: Option<CimValue>,
    pub out_params: Vec<ParamValue>,
}

fn unexpected(expected: &'static str, found: &TupleTree, context: &'static str) -> ProtocolError {
    ProtocolError::UnexpectedElement {
        expected,
        found: found.name.clone(),
        context,
    }
}

fn required_attr(tt: &TupleTree, attribute: &'static str, element: &'static str) -> ProtocolResult<String> {
    tt.attr(attribute)
        .map(str::to_owned)
        .ok_or(ProtocolError::MissingAttribute { attribute, element })
}

fn attr_bool(
    tt: &TupleTree,
    attribute: &'static str,
    element: &'static str,
) -> ProtocolResult<Option<bool>> {
    match tt.attr(attribute) {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(v) => Err(ProtocolError::InvalidAttribute {
            attribute,
            element,
            value: v.to_owned(),
            reason: "expected 'true' or 'false'".into(),
        }),
    }
}

fn attr_type(
    tt: &TupleTree,
    attribute: &'static str,
    element: &'static str,
) -> ProtocolResult<Option<CimType>> {
    match tt.attr(attribute) {
        None => Ok(None),
        Some(v) => v
            .parse::<CimType>()
            .map(Some)
            .map_err(|_| ProtocolError::InvalidAttribute {
                attribute,
                element,
                value: v.to_owned(),
                reason: "not a CIM type name".into(),
            }),
    }
}

fn attr_u32(
    tt: &TupleTree,
    attribute: &'static str,
    element: &'static str,
) -> ProtocolResult<Option<u32>> {
    match tt.attr(attribute) {
        None => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ProtocolError::InvalidAttribute {
                attribute,
                element,
                value: v.to_owned(),
                reason: e.to_string(),
            }),
    }
}

fn into_only_child(
    mut tt: TupleTree,
    expected: &'static str,
    context: &'static str,
) -> ProtocolResult<TupleTree> {
    if tt.children.is_empty() {
        return Err(ProtocolError::MissingElement { expected, context });
    }
    if tt.children.len() > 1 {
        return Err(unexpected(expected, &tt.children[1], context));
    }
    let child = tt.children.remove(0);
    if child.name != expected {
        return Err(unexpected(expected, &child, context));
    }
    Ok(child)
}

fn unwrap_simplersp(root: TupleTree) -> ProtocolResult<TupleTree> {
    if root.name != "CIM" {
        return Err(unexpected("CIM", &root, "document root"));
    }
    let message = into_only_child(root, "MESSAGE", "CIM")?;
    into_only_child(message, "SIMPLERSP", "MESSAGE")
}

/// Reduce a full response document for an intrinsic operation.
pub(crate) fn reduce_imethod_response(
    root: TupleTree,
    operation: &str,
) -> Result<IMethodResponse, RspError> {
    let simplersp = unwrap_simplersp(root)?;
    let response = into_only_child(simplersp, "IMETHODRESPONSE", "SIMPLERSP")?;
    let name = required_attr(&response, "NAME", "IMETHODRESPONSE")?;
    if !name.eq_ignore_ascii_case(operation) {
        return Err(ProtocolError::MethodNameMismatch {
            operation: operation.to_owned(),
            found: name,
        }
        .into());
    }

    // A server-reported error wins over any sibling return data.
    if let Some(error) = response.children.iter().find(|c| c.name == "ERROR") {
        return Err(parse_error_element(error)?.into());
    }

    let mut return_children: Option<Vec<TupleTree>> = None;
    let mut out_params = Vec::new();
    for child in response.children {
        match child.name.as_str() {
            "IRETURNVALUE" => {
                if return_children.is_some() {
                    return Err(unexpected("PARAMVALUE", &child, "IMETHODRESPONSE").into());
                }
                return_children = Some(child.children);
            }
            "PARAMVALUE" => out_params.push(parse_paramvalue(&child)?),
            _ => {
                return Err(
                    unexpected("IRETURNVALUE or PARAMVALUE", &child, "IMETHODRESPONSE").into(),
                );
            }
        }
    }
    trace!(
        "reduced {operation} response: {} return elements, {} out params",
        return_children.as_ref().map_or(0, Vec::len),
        out_params.len()
    );
    Ok(IMethodResponse {
        return_children,
        out_params,
    })
}

/// Reduce a full response document for an extrinsic method invocation.
pub(crate) fn reduce_method_response(
    root: TupleTree,
    operation: &str,
) -> Result<MethodResponse, RspError> {
    let simplersp = unwrap_simplersp(root)?;
    let response = into_only_child(simplersp, "METHODRESPONSE", "SIMPLERSP")?;
    let name = required_attr(&response, "NAME", "METHODRESPONSE")?;
    if !name.eq_ignore_ascii_case(operation) {
        return Err(ProtocolError::MethodNameMismatch {
            operation: operation.to_owned(),
            found: name,
        }
        .into());
    }

    if let Some(error) = response.children.iter().find(|c| c.name == "ERROR") {
        return Err(parse_error_element(error)?.into());
    }

    let mut return_value: Option<CimValue> = None;
    let mut out_params = Vec::new();
    for child in &response.children {
        match child.name.as_str() {
            "RETURNVALUE" => {
                if return_value.is_some() {
                    return Err(unexpected("PARAMVALUE", child, "METHODRESPONSE").into());
                }
                return_value = parse_returnvalue(child)?;
            }
            "PARAMVALUE" => out_params.push(parse_paramvalue(child)?),
            _ => {
                return Err(
                    unexpected("RETURNVALUE or PARAMVALUE", child, "METHODRESPONSE").into(),
                );
            }
        }
    }
    Ok(MethodResponse {
        return_value,
        out_params,
    })
}

fn parse_error_element(tt: &TupleTree) -> ProtocolResult<CimError> {
    let code_text = required_attr(tt, "CODE", "ERROR")?;
    let code = code_text
        .parse::<u32>()
        .map_err(|e| ProtocolError::InvalidAttribute {
            attribute: "CODE",
            element: "ERROR",
            value: code_text.clone(),
            reason: e.to_string(),
        })?;
    let description = tt.attr("DESCRIPTION").map(str::to_owned);
    let mut instances = Vec::new();
    for child in &tt.children {
        if child.name != "INSTANCE" {
            return Err(unexpected("INSTANCE", child, "ERROR"));
        }
        instances.push(parse_instance(child)?);
    }
    Ok(CimError::new(code, description).with_instances(instances))
}

fn parse_returnvalue(tt: &TupleTree) -> ProtocolResult<Option<CimValue>> {
    let ty = match attr_type(tt, "PARAMTYPE", "RETURNVALUE")? {
        Some(ty) => Some(ty),
        None => attr_type(tt, "TYPE", "RETURNVALUE")?,
    };
    match tt.children.as_slice() {
        [] => Ok(None),
        [child] => Ok(Some(parse_any_value(child, ty, "RETURNVALUE")?)),
        [_, second, ..] => Err(unexpected("a single value", second, "RETURNVALUE")),
    }
}

pub(crate) fn parse_paramvalue(tt: &TupleTree) -> ProtocolResult<ParamValue> {
    if tt.name != "PARAMVALUE" {
        return Err(unexpected("PARAMVALUE", tt, "response body"));
    }
    let name = required_attr(tt, "NAME", "PARAMVALUE")?;
    let ty = match attr_type(tt, "PARAMTYPE", "PARAMVALUE")? {
        Some(ty) => Some(ty),
        None => attr_type(tt, "TYPE", "PARAMVALUE")?,
    };
    let value = match tt.children.as_slice() {
        [] => None,
        [child] => Some(parse_any_value(child, ty, "PARAMVALUE")?),
        [_, second, ..] => return Err(unexpected("a single value", second, "PARAMVALUE")),
    };
    Ok(ParamValue { name, value })
}

/// Dispatch over the value-element alternatives a parameter or return value
/// may carry.
fn parse_any_value(
    tt: &TupleTree,
    declared: Option<CimType>,
    context: &'static str,
) -> ProtocolResult<CimValue> {
    match tt.name.as_str() {
        "VALUE" => {
            let ty = declared.unwrap_or(CimType::String);
            if let Some(kind) = embedded_marker(tt)? {
                return parse_embedded_value(&tt.text, kind);
            }
            Ok(CimValue::parse_scalar(&tt.text, ty)?)
        }
        "VALUE.ARRAY" => {
            let ty = declared.unwrap_or(CimType::String);
            Ok(CimValue::Array(parse_value_array(tt, ty)?))
        }
        "VALUE.REFERENCE" => Ok(CimValue::Reference(parse_value_reference(tt)?)),
        "VALUE.REFARRAY" => Ok(CimValue::Array(parse_value_refarray(tt)?)),
        "INSTANCE" => Ok(CimValue::Instance(Box::new(parse_instance(tt)?))),
        "CLASS" => Ok(CimValue::Class(Box::new(parse_class(tt)?))),
        _ => Err(unexpected("a value element", tt, context)),
    }
}

fn embedded_marker(tt: &TupleTree) -> ProtocolResult<Option<EmbeddedObjectKind>> {
    let marker = tt
        .attr("EMBEDDEDOBJECT")
        .or_else(|| tt.attr("EmbeddedObject"));
    match marker {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("instance") => Ok(Some(EmbeddedObjectKind::Instance)),
        Some(v) if v.eq_ignore_ascii_case("object") => Ok(Some(EmbeddedObjectKind::Object)),
        Some(v) => Err(ProtocolError::InvalidAttribute {
            attribute: "EMBEDDEDOBJECT",
            element: "VALUE",
            value: v.to_owned(),
            reason: "expected 'instance' or 'object'".into(),
        }),
    }
}

/// An embedded object arrives as an escaped CIM-XML document inside string
/// text; parse it back out.
fn parse_embedded_value(text: &str, kind: EmbeddedObjectKind) -> ProtocolResult<CimValue> {
    let tree = TupleTree::parse(text.as_bytes()).map_err(|e| {
        ProtocolError::Value(ValueError::Malformed {
            text: text.chars().take(64).collect(),
            cim_type: "string",
            reason: format!("embedded object does not parse: {e}"),
        })
    })?;
    match (tree.name.as_str(), kind) {
        ("INSTANCE", _) => Ok(CimValue::Instance(Box::new(parse_instance(&tree)?))),
        ("CLASS", EmbeddedObjectKind::Object) => Ok(CimValue::Class(Box::new(parse_class(&tree)?))),
        _ => Err(ProtocolError::Value(ValueError::Malformed {
            text: tree.name,
            cim_type: "string",
            reason: "embedded object must be INSTANCE or CLASS".into(),
        })),
    }
}

pub(crate) fn parse_value_array(tt: &TupleTree, element_type: CimType) -> ProtocolResult<CimArray> {
    let mut elements = Vec::with_capacity(tt.children.len());
    for child in &tt.children {
        match child.name.as_str() {
            "VALUE" => elements.push(Some(CimValue::parse_scalar(&child.text, element_type)?)),
            "VALUE.NULL" => elements.push(None),
            _ => return Err(unexpected("VALUE or VALUE.NULL", child, "VALUE.ARRAY")),
        }
    }
    Ok(CimArray::with_nulls(element_type, elements)?)
}

fn parse_value_refarray(tt: &TupleTree) -> ProtocolResult<CimArray> {
    let mut elements = Vec::with_capacity(tt.children.len());
    for child in &tt.children {
        match child.name.as_str() {
            "VALUE.REFERENCE" => {
                elements.push(Some(CimValue::Reference(parse_value_reference(child)?)));
            }
            "VALUE.NULL" => elements.push(None),
            _ => {
                return Err(unexpected(
                    "VALUE.REFERENCE or VALUE.NULL",
                    child,
                    "VALUE.REFARRAY",
                ));
            }
        }
    }
    Ok(CimArray::with_nulls(CimType::Reference, elements)?)
}

pub(crate) fn parse_value_reference(tt: &TupleTree) -> ProtocolResult<CimObjectPath> {
    let child = match tt.children.as_slice() {
        [child] => child,
        [] => {
            return Err(ProtocolError::MissingElement {
                expected: "a path element",
                context: "VALUE.REFERENCE",
            });
        }
        [_, second, ..] => return Err(unexpected("a single path element", second, "VALUE.REFERENCE")),
    };
    match child.name.as_str() {
        "INSTANCEPATH" => parse_instancepath(child),
        "LOCALINSTANCEPATH" => parse_localinstancepath(child),
        "INSTANCENAME" => parse_instancename(child),
        "CLASSPATH" => parse_classpath(child),
        "LOCALCLASSPATH" => parse_localclasspath(child),
        "CLASSNAME" => Ok(CimObjectPath::new(parse_classname_element(child)?)),
        _ => Err(unexpected("a path element", child, "VALUE.REFERENCE")),
    }
}

pub(crate) fn parse_classname_element(tt: &TupleTree) -> ProtocolResult<String> {
    if tt.name != "CLASSNAME" {
        return Err(unexpected("CLASSNAME", tt, "path"));
    }
    required_attr(tt, "NAME", "CLASSNAME")
}

pub(crate) fn parse_localnamespacepath(tt: &TupleTree) -> ProtocolResult<String> {
    if tt.name != "LOCALNAMESPACEPATH" {
        return Err(unexpected("LOCALNAMESPACEPATH", tt, "path"));
    }
    let mut parts = Vec::with_capacity(tt.children.len());
    for child in &tt.children {
        if child.name != "NAMESPACE" {
            return Err(unexpected("NAMESPACE", child, "LOCALNAMESPACEPATH"));
        }
        parts.push(required_attr(child, "NAME", "NAMESPACE")?);
    }
    if parts.is_empty() {
        return Err(ProtocolError::MissingElement {
            expected: "NAMESPACE",
            context: "LOCALNAMESPACEPATH",
        });
    }
    Ok(parts.join("/"))
}

fn parse_namespacepath(tt: &TupleTree) -> ProtocolResult<(String, String)> {
    if tt.name != "NAMESPACEPATH" {
        return Err(unexpected("NAMESPACEPATH", tt, "path"));
    }
    match tt.children.as_slice() {
        [host, local] if host.name == "HOST" => {
            Ok((host.text.clone(), parse_localnamespacepath(local)?))
        }
        [first, ..] => Err(unexpected("HOST", first, "NAMESPACEPATH")),
        [] => Err(ProtocolError::MissingElement {
            expected: "HOST",
            context: "NAMESPACEPATH",
        }),
    }
}

pub(crate) fn parse_instancename(tt: &TupleTree) -> ProtocolResult<CimObjectPath> {
    if tt.name != "INSTANCENAME" {
        return Err(unexpected("INSTANCENAME", tt, "path"));
    }
    let classname = required_attr(tt, "CLASSNAME", "INSTANCENAME")?;
    let mut path = CimObjectPath::new(classname);
    for child in &tt.children {
        if child.name != "KEYBINDING" {
            return Err(unexpected("KEYBINDING", child, "INSTANCENAME"));
        }
        let (name, value) = parse_keybinding(child)?;
        path.add_keybinding(name, value);
    }
    Ok(path)
}

fn parse_keybinding(tt: &TupleTree) -> ProtocolResult<(String, CimValue)> {
    let name = required_attr(tt, "NAME", "KEYBINDING")?;
    let child = match tt.children.as_slice() {
        [child] => child,
        [] => {
            return Err(ProtocolError::MissingElement {
                expected: "KEYVALUE or VALUE.REFERENCE",
                context: "KEYBINDING",
            });
        }
        [_, second, ..] => return Err(unexpected("a single value", second, "KEYBINDING")),
    };
    let value = match child.name.as_str() {
        "KEYVALUE" => parse_keyvalue(child)?,
        "VALUE.REFERENCE" => CimValue::Reference(parse_value_reference(child)?),
        _ => return Err(unexpected("KEYVALUE or VALUE.REFERENCE", child, "KEYBINDING")),
    };
    Ok((name, value))
}

fn parse_keyvalue(tt: &TupleTree) -> ProtocolResult<CimValue> {
    if let Some(ty) = attr_type(tt, "TYPE", "KEYVALUE")? {
        return Ok(CimValue::parse_scalar(&tt.text, ty)?);
    }
    // Older servers send only VALUETYPE; pick the widest type of its class.
    let valuetype = tt.attr("VALUETYPE").unwrap_or("string");
    let value = match valuetype {
        "string" => CimValue::String(tt.text.clone()),
        "boolean" => CimValue::parse_scalar(&tt.text, CimType::Boolean)?,
        "numeric" => {
            let text = tt.text.as_str();
            if text.contains(['.', 'e', 'E']) {
                CimValue::parse_scalar(text, CimType::Real64)?
            } else if text.starts_with('-') {
                CimValue::parse_scalar(text, CimType::Sint64)?
            } else {
                CimValue::parse_scalar(text, CimType::Uint64)?
            }
        }
        other => {
            return Err(ProtocolError::InvalidAttribute {
                attribute: "VALUETYPE",
                element: "KEYVALUE",
                value: other.to_owned(),
                reason: "expected 'string', 'boolean' or 'numeric'".into(),
            });
        }
    };
    Ok(value)
}

pub(crate) fn parse_instancepath(tt: &TupleTree) -> ProtocolResult<CimObjectPath> {
    if tt.name != "INSTANCEPATH" {
        return Err(unexpected("INSTANCEPATH", tt, "path"));
    }
    match tt.children.as_slice() {
        [nspath, iname] => {
            let (host, namespace) = parse_namespacepath(nspath)?;
            let mut path = parse_instancename(iname)?;
            path.set_namespace(Some(namespace));
            path.set_host(Some(host));
            Ok(path)
        }
        [only] => Err(unexpected("NAMESPACEPATH and INSTANCENAME", only, "INSTANCEPATH")),
        _ => Err(ProtocolError::MissingElement {
            expected: "NAMESPACEPATH",
            context: "INSTANCEPATH",
        }),
    }
}

fn parse_localinstancepath(tt: &TupleTree) -> ProtocolResult<CimObjectPath> {
    if tt.name != "LOCALINSTANCEPATH" {
        return Err(unexpected("LOCALINSTANCEPATH", tt, "path"));
    }
    match tt.children.as_slice() {
        [nspath, iname] => {
            let namespace = parse_localnamespacepath(nspath)?;
            let mut path = parse_instancename(iname)?;
            path.set_namespace(Some(namespace));
            Ok(path)
        }
        _ => Err(ProtocolError::MissingElement {
            expected: "LOCALNAMESPACEPATH",
            context: "LOCALINSTANCEPATH",
        }),
    }
}

fn parse_classpath(tt: &TupleTree) -> ProtocolResult<CimObjectPath> {
    if tt.name != "CLASSPATH" {
        return Err(unexpected("CLASSPATH", tt, "path"));
    }
    match tt.children.as_slice() {
        [nspath, cname] => {
            let (host, namespace) = parse_namespacepath(nspath)?;
            Ok(CimObjectPath::new(parse_classname_element(cname)?)
                .with_namespace(namespace)
                .with_host(host))
        }
        _ => Err(ProtocolError::MissingElement {
            expected: "NAMESPACEPATH",
            context: "CLASSPATH",
        }),
    }
}

fn parse_localclasspath(tt: &TupleTree) -> ProtocolResult<CimObjectPath> {
    if tt.name != "LOCALCLASSPATH" {
        return Err(unexpected("LOCALCLASSPATH", tt, "path"));
    }
    match tt.children.as_slice() {
        [nspath, cname] => {
            let namespace = parse_localnamespacepath(nspath)?;
            Ok(CimObjectPath::new(parse_classname_element(cname)?).with_namespace(namespace))
        }
        _ => Err(ProtocolError::MissingElement {
            expected: "LOCALNAMESPACEPATH",
            context: "LOCALCLASSPATH",
        }),
    }
}

pub(crate) fn parse_objectpath(tt: &TupleTree) -> ProtocolResult<CimObjectPath> {
    if tt.name != "OBJECTPATH" {
        return Err(unexpected("OBJECTPATH", tt, "return value"));
    }
    match tt.children.as_slice() {
        [child] if child.name == "INSTANCEPATH" => parse_instancepath(child),
        [child] if child.name == "CLASSPATH" => parse_classpath(child),
        [child] => Err(unexpected("INSTANCEPATH or CLASSPATH", child, "OBJECTPATH")),
        _ => Err(ProtocolError::MissingElement {
            expected: "INSTANCEPATH or CLASSPATH",
            context: "OBJECTPATH",
        }),
    }
}

pub(crate) fn parse_instance(tt: &TupleTree) -> ProtocolResult<CimInstance> {
    if tt.name != "INSTANCE" {
        return Err(unexpected("INSTANCE", tt, "object"));
    }
    let classname = required_attr(tt, "CLASSNAME", "INSTANCE")?;
    let mut instance = CimInstance::new(classname);
    for child in &tt.children {
        match child.name.as_str() {
            "QUALIFIER" => {
                let q = parse_qualifier(child)?;
                instance.qualifiers_mut().insert(q.name().to_owned(), q);
            }
            "PROPERTY" | "PROPERTY.ARRAY" | "PROPERTY.REFERENCE" => {
                instance.add_property(parse_property(child)?);
            }
            _ => return Err(unexpected("QUALIFIER or PROPERTY*", child, "INSTANCE")),
        }
    }
    Ok(instance)
}

pub(crate) fn parse_property(tt: &TupleTree) -> ProtocolResult<CimProperty> {
    match tt.name.as_str() {
        "PROPERTY" => {
            let name = required_attr(tt, "NAME", "PROPERTY")?;
            let ty = attr_type(tt, "TYPE", "PROPERTY")?.ok_or(ProtocolError::MissingAttribute {
                attribute: "TYPE",
                element: "PROPERTY",
            })?;
            let embedded = embedded_marker(tt)?;
            let mut prop = CimProperty::new(name, ty);
            prop.set_class_origin(tt.attr("CLASSORIGIN").map(str::to_owned));
            prop.set_propagated(attr_bool(tt, "PROPAGATED", "PROPERTY")?);
            prop.set_embedded_object(embedded);
            for child in &tt.children {
                match child.name.as_str() {
                    "QUALIFIER" => {
                        let q = parse_qualifier(child)?;
                        prop.qualifiers_mut().insert(q.name().to_owned(), q);
                    }
                    "VALUE" => {
                        let value = match embedded {
                            Some(kind) => parse_embedded_value(&child.text, kind)?,
                            None => CimValue::parse_scalar(&child.text, ty)?,
                        };
                        prop.set_value(Some(value));
                    }
                    _ => return Err(unexpected("QUALIFIER or VALUE", child, "PROPERTY")),
                }
            }
            Ok(prop)
        }
        "PROPERTY.ARRAY" => {
            let name = required_attr(tt, "NAME", "PROPERTY.ARRAY")?;
            let ty = attr_type(tt, "TYPE", "PROPERTY.ARRAY")?.ok_or(
                ProtocolError::MissingAttribute {
                    attribute: "TYPE",
                    element: "PROPERTY.ARRAY",
                },
            )?;
            let mut prop =
                CimProperty::new(name, ty).array(attr_u32(tt, "ARRAYSIZE", "PROPERTY.ARRAY")?);
            prop.set_class_origin(tt.attr("CLASSORIGIN").map(str::to_owned));
            prop.set_propagated(attr_bool(tt, "PROPAGATED", "PROPERTY.ARRAY")?);
            prop.set_embedded_object(embedded_marker(tt)?);
            for child in &tt.children {
                match child.name.as_str() {
                    "QUALIFIER" => {
                        let q = parse_qualifier(child)?;
                        prop.qualifiers_mut().insert(q.name().to_owned(), q);
                    }
                    "VALUE.ARRAY" => {
                        prop.set_value(Some(CimValue::Array(parse_value_array(child, ty)?)));
                    }
                    _ => {
                        return Err(unexpected(
                            "QUALIFIER or VALUE.ARRAY",
                            child,
                            "PROPERTY.ARRAY",
                        ));
                    }
                }
            }
            Ok(prop)
        }
        "PROPERTY.REFERENCE" => {
            let name = required_attr(tt, "NAME", "PROPERTY.REFERENCE")?;
            let mut prop = CimProperty::new(name, CimType::Reference);
            prop.set_reference_class(tt.attr("REFERENCECLASS").map(str::to_owned));
            prop.set_class_origin(tt.attr("CLASSORIGIN").map(str::to_owned));
            prop.set_propagated(attr_bool(tt, "PROPAGATED", "PROPERTY.REFERENCE")?);
            for child in &tt.children {
                match child.name.as_str() {
                    "QUALIFIER" => {
                        let q = parse_qualifier(child)?;
                        prop.qualifiers_mut().insert(q.name().to_owned(), q);
                    }
                    "VALUE.REFERENCE" => {
                        prop.set_value(Some(CimValue::Reference(parse_value_reference(child)?)));
                    }
                    _ => {
                        return Err(unexpected(
                            "QUALIFIER or VALUE.REFERENCE",
                            child,
                            "PROPERTY.REFERENCE",
                        ));
                    }
                }
            }
            Ok(prop)
        }
        _ => Err(unexpected("PROPERTY*", tt, "object")),
    }
}

pub(crate) fn parse_qualifier(tt: &TupleTree) -> ProtocolResult<CimQualifier> {
    if tt.name != "QUALIFIER" {
        return Err(unexpected("QUALIFIER", tt, "object"));
    }
    let name = required_attr(tt, "NAME", "QUALIFIER")?;
    let ty = attr_type(tt, "TYPE", "QUALIFIER")?.ok_or(ProtocolError::MissingAttribute {
        attribute: "TYPE",
        element: "QUALIFIER",
    })?;
    let mut qualifier = CimQualifier::new(name, ty);
    qualifier.set_propagated(attr_bool(tt, "PROPAGATED", "QUALIFIER")?);
    qualifier.set_flavors(
        attr_bool(tt, "OVERRIDABLE", "QUALIFIER")?,
        attr_bool(tt, "TOSUBCLASS", "QUALIFIER")?,
        attr_bool(tt, "TOINSTANCE", "QUALIFIER")?,
        attr_bool(tt, "TRANSLATABLE", "QUALIFIER")?,
    );
    match tt.children.as_slice() {
        [] => {}
        [child] if child.name == "VALUE" => {
            qualifier.set_value(Some(CimValue::parse_scalar(&child.text, ty)?));
        }
        [child] if child.name == "VALUE.ARRAY" => {
            qualifier.set_value(Some(CimValue::Array(parse_value_array(child, ty)?)));
        }
        [child] => return Err(unexpected("VALUE or VALUE.ARRAY", child, "QUALIFIER")),
        [_, second, ..] => return Err(unexpected("a single value", second, "QUALIFIER")),
    }
    Ok(qualifier)
}

pub(crate) fn parse_qualifier_declaration(tt: &TupleTree) -> ProtocolResult<CimQualifierDeclaration> {
    if tt.name != "QUALIFIER.DECLARATION" {
        return Err(unexpected("QUALIFIER.DECLARATION", tt, "return value"));
    }
    let name = required_attr(tt, "NAME", "QUALIFIER.DECLARATION")?;
    let ty = attr_type(tt, "TYPE", "QUALIFIER.DECLARATION")?.ok_or(
        ProtocolError::MissingAttribute {
            attribute: "TYPE",
            element: "QUALIFIER.DECLARATION",
        },
    )?;
    let mut decl = CimQualifierDeclaration::new(name, ty);
    if attr_bool(tt, "ISARRAY", "QUALIFIER.DECLARATION")?.unwrap_or(false) {
        decl = decl.array(attr_u32(tt, "ARRAYSIZE", "QUALIFIER.DECLARATION")?);
    }
    decl.set_flavors(
        attr_bool(tt, "OVERRIDABLE", "QUALIFIER.DECLARATION")?,
        attr_bool(tt, "TOSUBCLASS", "QUALIFIER.DECLARATION")?,
        attr_bool(tt, "TOINSTANCE", "QUALIFIER.DECLARATION")?,
        attr_bool(tt, "TRANSLATABLE", "QUALIFIER.DECLARATION")?,
    );
    for child in &tt.children {
        match child.name.as_str() {
            "SCOPE" => *decl.scopes_mut() = parse_scope(child)?,
            "VALUE" => {
                let value = CimValue::parse_scalar(&child.text, ty)?;
                decl = decl.with_value(value);
            }
            "VALUE.ARRAY" => {
                decl = decl.with_value(CimValue::Array(parse_value_array(child, ty)?));
            }
            _ => {
                return Err(unexpected(
                    "SCOPE, VALUE or VALUE.ARRAY",
                    child,
                    "QUALIFIER.DECLARATION",
                ));
            }
        }
    }
    Ok(decl)
}

fn parse_scope(tt: &TupleTree) -> ProtocolResult<QualifierScopes> {
    Ok(QualifierScopes {
        class: attr_bool(tt, "CLASS", "SCOPE")?.unwrap_or(false),
        association: attr_bool(tt, "ASSOCIATION", "SCOPE")?.unwrap_or(false),
        reference: attr_bool(tt, "REFERENCE", "SCOPE")?.unwrap_or(false),
        property: attr_bool(tt, "PROPERTY", "SCOPE")?.unwrap_or(false),
        method: attr_bool(tt, "METHOD", "SCOPE")?.unwrap_or(false),
        parameter: attr_bool(tt, "PARAMETER", "SCOPE")?.unwrap_or(false),
        indication: attr_bool(tt, "INDICATION", "SCOPE")?.unwrap_or(false),
        any: false,
    })
}

pub(crate) fn parse_class(tt: &TupleTree) -> ProtocolResult<CimClass> {
    if tt.name != "CLASS" {
        return Err(unexpected("CLASS", tt, "object"));
    }
    let name = required_attr(tt, "NAME", "CLASS")?;
    let mut class = CimClass::new(name);
    class.set_superclass(tt.attr("SUPERCLASS").map(str::to_owned));
    for child in &tt.children {
        match child.name.as_str() {
            "QUALIFIER" => {
                let q = parse_qualifier(child)?;
                class.qualifiers_mut().insert(q.name().to_owned(), q);
            }
            "PROPERTY" | "PROPERTY.ARRAY" | "PROPERTY.REFERENCE" => {
                let p = parse_property(child)?;
                class.properties_mut().insert(p.name().to_owned(), p);
            }
            "METHOD" => {
                let m = parse_method(child)?;
                class.methods_mut().insert(m.name().to_owned(), m);
            }
            _ => {
                return Err(unexpected(
                    "QUALIFIER, PROPERTY* or METHOD",
                    child,
                    "CLASS",
                ));
            }
        }
    }
    Ok(class)
}

fn parse_method(tt: &TupleTree) -> ProtocolResult<CimMethod> {
    let name = required_attr(tt, "NAME", "METHOD")?;
    let return_type = attr_type(tt, "TYPE", "METHOD")?;
    let mut method = CimMethod::new(name, return_type);
    method.set_class_origin(tt.attr("CLASSORIGIN").map(str::to_owned));
    method.set_propagated(attr_bool(tt, "PROPAGATED", "METHOD")?);
    for child in &tt.children {
        match child.name.as_str() {
            "QUALIFIER" => {
                let q = parse_qualifier(child)?;
                method.qualifiers_mut().insert(q.name().to_owned(), q);
            }
            "PARAMETER" | "PARAMETER.REFERENCE" | "PARAMETER.ARRAY" | "PARAMETER.REFARRAY" => {
                let p = parse_parameter(child)?;
                method.parameters_mut().insert(p.name().to_owned(), p);
            }
            _ => return Err(unexpected("QUALIFIER or PARAMETER*", child, "METHOD")),
        }
    }
    Ok(method)
}

fn parse_parameter(tt: &TupleTree) -> ProtocolResult<CimParameter> {
    let element: &'static str = match tt.name.as_str() {
        "PARAMETER" => "PARAMETER",
        "PARAMETER.REFERENCE" => "PARAMETER.REFERENCE",
        "PARAMETER.ARRAY" => "PARAMETER.ARRAY",
        "PARAMETER.REFARRAY" => "PARAMETER.REFARRAY",
        _ => return Err(unexpected("PARAMETER*", tt, "METHOD")),
    };
    let name = required_attr(tt, "NAME", element)?;
    let reference = matches!(element, "PARAMETER.REFERENCE" | "PARAMETER.REFARRAY");
    let array = matches!(element, "PARAMETER.ARRAY" | "PARAMETER.REFARRAY");
    let ty = if reference {
        CimType::Reference
    } else {
        attr_type(tt, "TYPE", element)?.ok_or(ProtocolError::MissingAttribute {
            attribute: "TYPE",
            element,
        })?
    };
    let mut param = CimParameter::new(name, ty);
    if reference {
        if let Some(rc) = tt.attr("REFERENCECLASS") {
            param = param.with_reference_class(rc.to_owned());
        }
    }
    if array {
        param = param.array(attr_u32(tt, "ARRAYSIZE", element)?);
    }
    for child in &tt.children {
        if child.name != "QUALIFIER" {
            return Err(unexpected("QUALIFIER", child, "PARAMETER"));
        }
        let q = parse_qualifier(child)?;
        param.qualifiers_mut().insert(q.name().to_owned(), q);
    }
    Ok(param)
}

fn set_instance_path(
    mut instance: CimInstance,
    path: CimObjectPath,
    context: &'static str,
) -> ProtocolResult<CimInstance> {
    let path_class = path.classname().to_owned();
    instance.set_path(path).map_err(|_| ProtocolError::InvalidAttribute {
        attribute: "CLASSNAME",
        element: context,
        value: path_class,
        reason: "path classname does not match instance classname".into(),
    })?;
    Ok(instance)
}

/// `VALUE.NAMEDINSTANCE`: instance plus its namespace-less name.
pub(crate) fn parse_value_namedinstance(tt: &TupleTree) -> ProtocolResult<CimInstance> {
    if tt.name != "VALUE.NAMEDINSTANCE" {
        return Err(unexpected("VALUE.NAMEDINSTANCE", tt, "return value"));
    }
    match tt.children.as_slice() {
        [iname, inst] => {
            let path = parse_instancename(iname)?;
            let instance = parse_instance(inst)?;
            set_instance_path(instance, path, "VALUE.NAMEDINSTANCE")
        }
        _ => Err(ProtocolError::MissingElement {
            expected: "INSTANCENAME and INSTANCE",
            context: "VALUE.NAMEDINSTANCE",
        }),
    }
}

/// `VALUE.INSTANCEWITHPATH`: instance plus its full (host + namespace)
/// path, as used by the pull operations.
pub(crate) fn parse_value_instancewithpath(tt: &TupleTree) -> ProtocolResult<CimInstance> {
    if tt.name != "VALUE.INSTANCEWITHPATH" {
        return Err(unexpected("VALUE.INSTANCEWITHPATH", tt, "return value"));
    }
    match tt.children.as_slice() {
        [ipath, inst] => {
            let path = parse_instancepath(ipath)?;
            let instance = parse_instance(inst)?;
            set_instance_path(instance, path, "VALUE.INSTANCEWITHPATH")
        }
        _ => Err(ProtocolError::MissingElement {
            expected: "INSTANCEPATH and INSTANCE",
            context: "VALUE.INSTANCEWITHPATH",
        }),
    }
}

/// `VALUE.OBJECTWITHPATH`: instance-with-path or class-with-path, as used
/// by the association operations.
pub(crate) fn parse_value_objectwithpath(tt: &TupleTree) -> ProtocolResult<CimObject> {
    if tt.name != "VALUE.OBJECTWITHPATH" {
        return Err(unexpected("VALUE.OBJECTWITHPATH", tt, "return value"));
    }
    match tt.children.as_slice() {
        [path, obj] if path.name == "INSTANCEPATH" => {
            let path = parse_instancepath(path)?;
            let instance = parse_instance(obj)?;
            Ok(CimObject::Instance(set_instance_path(
                instance,
                path,
                "VALUE.OBJECTWITHPATH",
            )?))
        }
        [path, obj] if path.name == "CLASSPATH" => {
            let path = parse_classpath(path)?;
            let mut class = parse_class(obj)?;
            class.set_path(Some(path));
            Ok(CimObject::Class(class))
        }
        [first, _] => Err(unexpected("INSTANCEPATH or CLASSPATH", first, "VALUE.OBJECTWITHPATH")),
        _ => Err(ProtocolError::MissingElement {
            expected: "a path and an object",
            context: "VALUE.OBJECTWITHPATH",
        }),
    }
}

fn parse_value_objectwithlocalpath(tt: &TupleTree) -> ProtocolResult<CimObject> {
    match tt.children.as_slice() {
        [path, obj] if path.name == "LOCALINSTANCEPATH" => {
            let path = parse_localinstancepath(path)?;
            let instance = parse_instance(obj)?;
            Ok(CimObject::Instance(set_instance_path(
                instance,
                path,
                "VALUE.OBJECTWITHLOCALPATH",
            )?))
        }
        [path, obj] if path.name == "LOCALCLASSPATH" => {
            let path = parse_localclasspath(path)?;
            let mut class = parse_class(obj)?;
            class.set_path(Some(path));
            Ok(CimObject::Class(class))
        }
        [first, _] => Err(unexpected(
            "LOCALINSTANCEPATH or LOCALCLASSPATH",
            first,
            "VALUE.OBJECTWITHLOCALPATH",
        )),
        _ => Err(ProtocolError::MissingElement {
            expected: "a local path and an object",
            context: "VALUE.OBJECTWITHLOCALPATH",
        }),
    }
}

// Batch extractors over IRETURNVALUE children. Each enforces that every
// child has the one element kind the operation's return shape declares.

pub(crate) fn named_instances(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimInstance>> {
    children
        .iter()
        .map(parse_value_namedinstance)
        .collect()
}

pub(crate) fn instances_with_path(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimInstance>> {
    children
        .iter()
        .map(parse_value_instancewithpath)
        .collect()
}

pub(crate) fn plain_instances(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimInstance>> {
    children.iter().map(parse_instance).collect()
}

pub(crate) fn instance_names(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimObjectPath>> {
    children.iter().map(parse_instancename).collect()
}

pub(crate) fn instance_paths(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimObjectPath>> {
    children.iter().map(parse_instancepath).collect()
}

pub(crate) fn objects_with_path(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimObject>> {
    children.iter().map(parse_value_objectwithpath).collect()
}

pub(crate) fn object_paths(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimObjectPath>> {
    children.iter().map(parse_objectpath).collect()
}

/// ExecQuery's result alternatives.
pub(crate) fn query_objects(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimObject>> {
    children
        .iter()
        .map(|child| match child.name.as_str() {
            "VALUE.OBJECT" => match child.children.as_slice() {
                [obj] if obj.name == "INSTANCE" => Ok(CimObject::Instance(parse_instance(obj)?)),
                [obj] if obj.name == "CLASS" => Ok(CimObject::Class(parse_class(obj)?)),
                [first, ..] => Err(unexpected("INSTANCE or CLASS", first, "VALUE.OBJECT")),
                [] => Err(ProtocolError::MissingElement {
                    expected: "INSTANCE or CLASS",
                    context: "VALUE.OBJECT",
                }),
            },
            "VALUE.OBJECTWITHLOCALPATH" => parse_value_objectwithlocalpath(child),
            "VALUE.OBJECTWITHPATH" => parse_value_objectwithpath(child),
            _ => Err(unexpected(
                "VALUE.OBJECT, VALUE.OBJECTWITHLOCALPATH or VALUE.OBJECTWITHPATH",
                child,
                "IRETURNVALUE",
            )),
        })
        .collect()
}

pub(crate) fn classes(children: Vec<TupleTree>) -> ProtocolResult<Vec<CimClass>> {
    children.iter().map(parse_class).collect()
}

pub(crate) fn class_names(children: Vec<TupleTree>) -> ProtocolResult<Vec<String>> {
    children.iter().map(parse_classname_element).collect()
}

pub(crate) fn qualifier_declarations(
    children: Vec<TupleTree>,
) -> ProtocolResult<Vec<CimQualifierDeclaration>> {
    children.iter().map(parse_qualifier_declaration).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response(body: &str) -> TupleTree {
        let xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<CIM CIMVERSION="2.0" DTDVERSION="2.0">
 <MESSAGE ID="1001" PROTOCOLVERSION="1.0">
  <SIMPLERSP>{body}</SIMPLERSP>
 </MESSAGE>
</CIM>"#
        );
        TupleTree::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn reduces_ireturnvalue_and_out_params() {
        let tree = response(
            r#"<IMETHODRESPONSE NAME="OpenEnumerateInstances">
                 <IRETURNVALUE></IRETURNVALUE>
                 <PARAMVALUE NAME="EndOfSequence" PARAMTYPE="boolean"><VALUE>true</VALUE></PARAMVALUE>
               </IMETHODRESPONSE>"#,
        );
        let rsp = reduce_imethod_response(tree, "OpenEnumerateInstances").unwrap();
        assert_eq!(rsp.return_children.as_deref().unwrap().len(), 0);
        assert_eq!(rsp.out_params.len(), 1);
        assert_eq!(rsp.out_params[0].name, "EndOfSequence");
        assert_eq!(rsp.out_params[0].value, Some(CimValue::Boolean(true)));
    }

    #[test]
    fn missing_ireturnvalue_is_tolerated() {
        let tree = response(r#"<IMETHODRESPONSE NAME="DeleteInstance"/>"#);
        let rsp = reduce_imethod_response(tree, "DeleteInstance").unwrap();
        assert!(rsp.return_children.is_none());
        assert!(rsp.out_params.is_empty());
    }

    #[test]
    fn error_short_circuits_even_with_sibling_return_data() {
        let tree = response(
            r#"<IMETHODRESPONSE NAME="GetInstance">
                 <IRETURNVALUE><INSTANCE CLASSNAME="CIM_Foo"/></IRETURNVALUE>
                 <ERROR CODE="6" DESCRIPTION="not found"/>
               </IMETHODRESPONSE>"#,
        );
        match reduce_imethod_response(tree, "GetInstance").unwrap_err() {
            RspError::Cim(err) => {
                assert_eq!(err.status_code(), 6);
                assert_eq!(err.description(), Some("not found"));
            }
            other => panic!("expected CimError, got {other:?}"),
        }
    }

    #[test]
    fn error_carries_diagnostic_instances() {
        let tree = response(
            r#"<IMETHODRESPONSE NAME="GetInstance">
                 <ERROR CODE="1">
                   <INSTANCE CLASSNAME="CIM_Error">
                     <PROPERTY NAME="Message" TYPE="string"><VALUE>boom</VALUE></PROPERTY>
                   </INSTANCE>
                 </ERROR>
               </IMETHODRESPONSE>"#,
        );
        match reduce_imethod_response(tree, "GetInstance").unwrap_err() {
            RspError::Cim(err) => {
                assert_eq!(err.instances().len(), 1);
                assert_eq!(err.instances()[0].classname(), "CIM_Error");
            }
            other => panic!("expected CimError, got {other:?}"),
        }
    }

    #[test]
    fn method_name_mismatch_is_a_structural_error() {
        let tree = response(r#"<IMETHODRESPONSE NAME="GetClass"/>"#);
        match reduce_imethod_response(tree, "GetInstance").unwrap_err() {
            RspError::Protocol(ProtocolError::MethodNameMismatch { found, .. }) => {
                assert_eq!(found, "GetClass");
            }
            other => panic!("expected MethodNameMismatch, got {other:?}"),
        }
    }

    #[test]
    fn unexpected_element_names_expected_and_found() {
        let tree = response(r#"<IMETHODRESPONSE NAME="GetInstance"><BOGUS/></IMETHODRESPONSE>"#);
        match reduce_imethod_response(tree, "GetInstance").unwrap_err() {
            RspError::Protocol(ProtocolError::UnexpectedElement {
                expected, found, ..
            }) => {
                assert_eq!(expected, "IRETURNVALUE or PARAMVALUE");
                assert_eq!(found, "BOGUS");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn parses_named_instance_without_namespace() {
        let xml = r#"<VALUE.NAMEDINSTANCE>
            <INSTANCENAME CLASSNAME="CIM_Foo">
              <KEYBINDING NAME="Name"><KEYVALUE VALUETYPE="string">a</KEYVALUE></KEYBINDING>
            </INSTANCENAME>
            <INSTANCE CLASSNAME="CIM_Foo">
              <PROPERTY NAME="Name" TYPE="string"><VALUE>a</VALUE></PROPERTY>
            </INSTANCE>
          </VALUE.NAMEDINSTANCE>"#;
        let tree = TupleTree::parse(xml.as_bytes()).unwrap();
        let instance = parse_value_namedinstance(&tree).unwrap();
        let path = instance.path().unwrap();
        assert_eq!(path.classname(), "CIM_Foo");
        assert_eq!(path.namespace(), None);
        assert_eq!(path.host(), None);
        assert_eq!(
            instance.property_value("Name"),
            Some(&CimValue::String("a".into()))
        );
    }

    #[test]
    fn parses_instancewithpath_with_host_and_namespace() {
        let xml = r#"<VALUE.INSTANCEWITHPATH>
            <INSTANCEPATH>
              <NAMESPACEPATH>
                <HOST>cimom.example.com</HOST>
                <LOCALNAMESPACEPATH><NAMESPACE NAME="root"/><NAMESPACE NAME="cimv2"/></LOCALNAMESPACEPATH>
              </NAMESPACEPATH>
              <INSTANCENAME CLASSNAME="CIM_Foo">
                <KEYBINDING NAME="Index"><KEYVALUE VALUETYPE="numeric" TYPE="uint32">7</KEYVALUE></KEYBINDING>
              </INSTANCENAME>
            </INSTANCEPATH>
            <INSTANCE CLASSNAME="CIM_Foo"/>
          </VALUE.INSTANCEWITHPATH>"#;
        let tree = TupleTree::parse(xml.as_bytes()).unwrap();
        let instance = parse_value_instancewithpath(&tree).unwrap();
        let path = instance.path().unwrap();
        assert_eq!(path.host(), Some("cimom.example.com"));
        assert_eq!(path.namespace(), Some("root/cimv2"));
        assert_eq!(path.keybinding("Index"), Some(&CimValue::Uint32(7)));
    }

    #[test]
    fn keyvalue_without_type_uses_valuetype_class() {
        let tree =
            TupleTree::parse(br#"<KEYVALUE VALUETYPE="numeric">-5</KEYVALUE>"#).unwrap();
        assert_eq!(parse_keyvalue(&tree).unwrap(), CimValue::Sint64(-5));
        let tree = TupleTree::parse(br#"<KEYVALUE VALUETYPE="numeric">5</KEYVALUE>"#).unwrap();
        assert_eq!(parse_keyvalue(&tree).unwrap(), CimValue::Uint64(5));
        let tree = TupleTree::parse(br#"<KEYVALUE VALUETYPE="numeric">1.5</KEYVALUE>"#).unwrap();
        assert_eq!(parse_keyvalue(&tree).unwrap(), CimValue::Real64(1.5));
        let tree = TupleTree::parse(br#"<KEYVALUE VALUETYPE="boolean">TRUE</KEYVALUE>"#).unwrap();
        assert_eq!(parse_keyvalue(&tree).unwrap(), CimValue::Boolean(true));
    }

    #[test]
    fn out_of_range_property_value_is_a_typed_error() {
        let xml = r#"<INSTANCE CLASSNAME="CIM_Foo">
            <PROPERTY NAME="Level" TYPE="uint8"><VALUE>999</VALUE></PROPERTY>
          </INSTANCE>"#;
        let tree = TupleTree::parse(xml.as_bytes()).unwrap();
        match parse_instance(&tree).unwrap_err() {
            ProtocolError::Value(ValueError::OutOfRange { text, cim_type }) => {
                assert_eq!(text, "999");
                assert_eq!(cim_type, "uint8");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn parses_embedded_instance_property() {
        let xml = r#"<INSTANCE CLASSNAME="CIM_Outer">
            <PROPERTY NAME="Inner" TYPE="string" EMBEDDEDOBJECT="instance">
              <VALUE>&lt;INSTANCE CLASSNAME="CIM_Inner"&gt;&lt;PROPERTY NAME="Name" TYPE="string"&gt;&lt;VALUE&gt;x&lt;/VALUE&gt;&lt;/PROPERTY&gt;&lt;/INSTANCE&gt;</VALUE>
            </PROPERTY>
          </INSTANCE>"#;
        let tree = TupleTree::parse(xml.as_bytes()).unwrap();
        let outer = parse_instance(&tree).unwrap();
        let prop = outer.property("Inner").unwrap();
        assert_eq!(prop.embedded_object(), Some(EmbeddedObjectKind::Instance));
        match prop.value() {
            Some(CimValue::Instance(inner)) => {
                assert_eq!(inner.classname(), "CIM_Inner");
                assert_eq!(
                    inner.property_value("Name"),
                    Some(&CimValue::String("x".into()))
                );
            }
            other => panic!("expected embedded instance, got {other:?}"),
        }
    }

    #[test]
    fn parses_class_with_method_and_parameters() {
        let xml = r#"<CLASS NAME="CIM_Service" SUPERCLASS="CIM_EnabledLogicalElement">
            <QUALIFIER NAME="Abstract" TYPE="boolean"><VALUE>true</VALUE></QUALIFIER>
            <PROPERTY NAME="Name" TYPE="string"/>
            <METHOD NAME="StartService" TYPE="uint32">
              <PARAMETER NAME="Timeout" TYPE="uint32"/>
              <PARAMETER.REFERENCE NAME="Job" REFERENCECLASS="CIM_Job"/>
            </METHOD>
          </CLASS>"#;
        let tree = TupleTree::parse(xml.as_bytes()).unwrap();
        let class = parse_class(&tree).unwrap();
        assert_eq!(class.superclass(), Some("CIM_EnabledLogicalElement"));
        let method = class.methods().get("startservice").unwrap();
        assert_eq!(method.return_type(), Some(CimType::Uint32));
        assert_eq!(method.parameters().len(), 2);
        let job = method.parameters().get("Job").unwrap();
        assert_eq!(job.cim_type(), CimType::Reference);
        assert_eq!(job.reference_class(), Some("CIM_Job"));
    }

    #[test]
    fn parses_qualifier_declaration_with_scope() {
        let xml = r#"<QUALIFIER.DECLARATION NAME="Key" TYPE="boolean" OVERRIDABLE="false">
            <SCOPE PROPERTY="true" REFERENCE="true"/>
            <VALUE>false</VALUE>
          </QUALIFIER.DECLARATION>"#;
        let tree = TupleTree::parse(xml.as_bytes()).unwrap();
        let decl = parse_qualifier_declaration(&tree).unwrap();
        assert_eq!(decl.name(), "Key");
        assert_eq!(decl.overridable(), Some(false));
        assert!(decl.scopes().property);
        assert!(decl.scopes().reference);
        assert!(!decl.scopes().class);
        assert_eq!(decl.value(), Some(&CimValue::Boolean(false)));
    }

    #[test]
    fn refarray_values_parse_into_reference_array() {
        let xml = r#"<VALUE.REFARRAY>
            <VALUE.REFERENCE><CLASSNAME NAME="CIM_A"/></VALUE.REFERENCE>
            <VALUE.NULL/>
          </VALUE.REFARRAY>"#;
        let tree = TupleTree::parse(xml.as_bytes()).unwrap();
        let arr = parse_value_refarray(&tree).unwrap();
        assert_eq!(arr.element_type(), CimType::Reference);
        assert_eq!(arr.len(), 2);
        assert!(arr.elements()[1].is_none());
    }

    #[test]
    fn extrinsic_response_reduces_return_value() {
        let tree = response(
            r#"<METHODRESPONSE NAME="RequestStateChange">
                 <RETURNVALUE PARAMTYPE="uint32"><VALUE>0</VALUE></RETURNVALUE>
                 <PARAMVALUE NAME="Job" PARAMTYPE="reference">
                   <VALUE.REFERENCE><CLASSNAME NAME="CIM_Job"/></VALUE.REFERENCE>
                 </PARAMVALUE>
               </METHODRESPONSE>"#,
        );
        let rsp = reduce_method_response(tree, "RequestStateChange").unwrap();
        assert_eq!(rsp.return_value, Some(CimValue::Uint32(0)));
        assert_eq!(rsp.out_params.len(), 1);
        assert_eq!(rsp.out_params[0].name, "Job");
    }
}
