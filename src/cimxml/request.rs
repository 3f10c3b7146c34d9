use log::trace;

use crate::cim::{CimClass, CimInstance, CimObjectPath, CimQualifierDeclaration, CimValue};
use crate::cimxml::write::{
    XmlWriter, check_cim_string, write_class, write_classname, write_instance,
    write_instancename, write_localclasspath, write_localinstancepath, write_localnamespacepath,
    write_qualifier_declaration, write_value, write_value_namedinstance,
};
use crate::err::{BuildError, BuildResult, ParameterError};

/// Every message carries the same ID: requests are strictly one-at-a-time
/// per connection, so there is nothing to correlate.
pub(crate) const MESSAGE_ID: &str = "1001";
pub(crate) const PROTOCOL_VERSION: &str = "1.0";

/// One named input parameter of an intrinsic operation, already shaped for
/// its `IPARAMVALUE` payload. Absent (`None`-valued) parameters are simply
/// never staged.
#[derive(Debug, Clone)]
pub(crate) enum OpParam {
    Boolean(bool),
    String(String),
    Uint32(u32),
    StringArray(Vec<String>),
    ClassName(String),
    InstanceName(CimObjectPath),
    /// `INSTANCENAME` or `CLASSNAME` depending on whether the path carries
    /// key bindings.
    ObjectName(CimObjectPath),
    Instance(CimInstance),
    /// Instance plus its path, as `VALUE.NAMEDINSTANCE`.
    NamedInstance(CimInstance, CimObjectPath),
    Class(CimClass),
    QualifierDecl(CimQualifierDeclaration),
}

fn write_envelope_open(w: &mut XmlWriter) -> BuildResult<()> {
    w.declaration()?;
    w.start_attrs("CIM", &[("CIMVERSION", "2.0"), ("DTDVERSION", "2.0")])?;
    w.start_attrs(
        "MESSAGE",
        &[("ID", MESSAGE_ID), ("PROTOCOLVERSION", PROTOCOL_VERSION)],
    )?;
    w.start("SIMPLEREQ")
}

fn write_envelope_close(w: &mut XmlWriter) -> BuildResult<()> {
    w.end("SIMPLEREQ")?;
    w.end("MESSAGE")?;
    w.end("CIM")
}

fn write_iparamvalue(w: &mut XmlWriter, name: &str, param: &OpParam) -> BuildResult<()> {
    w.start_attrs("IPARAMVALUE", &[("NAME", name)])?;
    match param {
        OpParam::Boolean(v) => {
            w.start("VALUE")?;
            w.text(if *v { "true" } else { "false" })?;
            w.end("VALUE")?;
        }
        OpParam::String(s) => {
            check_cim_string(s)?;
            w.start("VALUE")?;
            w.text(s)?;
            w.end("VALUE")?;
        }
        OpParam::Uint32(v) => {
            w.start("VALUE")?;
            w.text(&v.to_string())?;
            w.end("VALUE")?;
        }
        OpParam::StringArray(items) => {
            w.start("VALUE.ARRAY")?;
            for item in items {
                check_cim_string(item)?;
                w.start("VALUE")?;
                w.text(item)?;
                w.end("VALUE")?;
            }
            w.end("VALUE.ARRAY")?;
        }
        OpParam::ClassName(name) => write_classname(w, name)?,
        OpParam::InstanceName(path) => write_instancename(w, path)?,
        OpParam::ObjectName(path) => {
            if path.is_instance_path() {
                write_instancename(w, path)?;
            } else {
                write_classname(w, path.classname())?;
            }
        }
        OpParam::Instance(instance) => write_instance(w, instance)?,
        OpParam::NamedInstance(instance, path) => write_value_namedinstance(w, instance, path)?,
        OpParam::Class(class) => write_class(w, class)?,
        OpParam::QualifierDecl(decl) => write_qualifier_declaration(w, decl)?,
    }
    w.end("IPARAMVALUE")
}

/// Build a complete intrinsic-operation request document.
pub(crate) fn build_imethodcall(
    method: &str,
    namespace: &str,
    params: &[(&str, OpParam)],
) -> BuildResult<Vec<u8>> {
    trace!("building IMETHODCALL {method} against {namespace}");
    let mut w = XmlWriter::new();
    write_envelope_open(&mut w)?;
    w.start_attrs("IMETHODCALL", &[("NAME", method)])?;
    write_localnamespacepath(&mut w, namespace)?;
    for (name, param) in params {
        write_iparamvalue(&mut w, name, param)?;
    }
    w.end("IMETHODCALL")?;
    write_envelope_close(&mut w)?;
    Ok(w.into_bytes())
}

/// Build a complete extrinsic method invocation.
///
/// Parameter types are inferred from the values; embedded instances and
/// classes travel as string parameters with an `EMBEDDEDOBJECT` marker.
/// The path must already carry the effective namespace.
pub(crate) fn build_methodcall(
    method: &str,
    path: &CimObjectPath,
    params: &[(String, CimValue)],
) -> BuildResult<Vec<u8>> {
    trace!(
        "building METHODCALL {method} on {}",
        path.classname()
    );
    let namespace = path.namespace().ok_or_else(|| {
        BuildError::Value(crate::err::ValueError::Malformed {
            text: path.to_string(),
            cim_type: "reference",
            reason: "method target must carry a namespace".into(),
        })
    })?;

    let mut w = XmlWriter::new();
    write_envelope_open(&mut w)?;
    w.start_attrs("METHODCALL", &[("NAME", method)])?;
    if path.is_instance_path() {
        write_localinstancepath(&mut w, namespace, path)?;
    } else {
        write_localclasspath(&mut w, namespace, path.classname())?;
    }
    for (name, value) in params {
        write_paramvalue(&mut w, name, value)?;
    }
    w.end("METHODCALL")?;
    write_envelope_close(&mut w)?;
    Ok(w.into_bytes())
}

fn write_paramvalue(w: &mut XmlWriter, name: &str, value: &CimValue) -> BuildResult<()> {
    let mut attrs: Vec<(&str, &str)> = vec![("NAME", name)];
    let ty_name = value.cim_type().name();
    attrs.push(("PARAMTYPE", ty_name));
    let marker = match value {
        CimValue::Instance(_) => Some("instance"),
        CimValue::Class(_) => Some("object"),
        _ => None,
    };
    if let Some(marker) = marker {
        attrs.push(("EMBEDDEDOBJECT", marker));
    }
    w.start_attrs("PARAMVALUE", &attrs)?;
    write_value(w, value)?;
    w.end("PARAMVALUE")
}

/// Validates and normalizes an extrinsic parameter list before building:
/// every array must be homogeneous (the array type itself enforces this),
/// and names must be non-empty.
pub(crate) fn check_method_params(params: &[(String, CimValue)]) -> Result<(), ParameterError> {
    for (name, _) in params {
        if name.is_empty() {
            return Err(ParameterError::Invalid {
                parameter: "Params",
                reason: "parameter names must be non-empty".into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utf8(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn imethodcall_has_fixed_envelope() {
        let body = utf8(
            build_imethodcall(
                "EnumerateInstances",
                "root/cimv2",
                &[("ClassName", OpParam::ClassName("CIM_Foo".into()))],
            )
            .unwrap(),
        );
        assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(body.contains("<CIM CIMVERSION=\"2.0\" DTDVERSION=\"2.0\">"));
        assert!(body.contains("<MESSAGE ID=\"1001\" PROTOCOLVERSION=\"1.0\">"));
        assert!(body.contains("<SIMPLEREQ><IMETHODCALL NAME=\"EnumerateInstances\">"));
        assert!(body.contains(
            "<LOCALNAMESPACEPATH><NAMESPACE NAME=\"root\"/><NAMESPACE NAME=\"cimv2\"/></LOCALNAMESPACEPATH>"
        ));
        assert!(body.contains(
            "<IPARAMVALUE NAME=\"ClassName\"><CLASSNAME NAME=\"CIM_Foo\"/></IPARAMVALUE>"
        ));
        assert!(body.ends_with("</IMETHODCALL></SIMPLEREQ></MESSAGE></CIM>"));
    }

    #[test]
    fn objectname_picks_classname_without_keybindings() {
        let class_body = utf8(
            build_imethodcall(
                "Associators",
                "root/cimv2",
                &[(
                    "ObjectName",
                    OpParam::ObjectName(CimObjectPath::new("CIM_Foo")),
                )],
            )
            .unwrap(),
        );
        assert!(class_body.contains("<CLASSNAME NAME=\"CIM_Foo\"/>"));

        let inst_body = utf8(
            build_imethodcall(
                "Associators",
                "root/cimv2",
                &[(
                    "ObjectName",
                    OpParam::ObjectName(
                        CimObjectPath::new("CIM_Foo")
                            .with_keybinding("Name", CimValue::String("a".into())),
                    ),
                )],
            )
            .unwrap(),
        );
        assert!(inst_body.contains("<INSTANCENAME CLASSNAME=\"CIM_Foo\">"));
    }

    #[test]
    fn methodcall_infers_paramtype() {
        let path = CimObjectPath::new("CIM_Foo")
            .with_namespace("root/cimv2")
            .with_keybinding("Name", CimValue::String("a".into()));
        let body = utf8(
            build_methodcall(
                "RequestStateChange",
                &path,
                &[
                    ("RequestedState".to_owned(), CimValue::Uint16(3)),
                    ("Force".to_owned(), CimValue::Boolean(true)),
                ],
            )
            .unwrap(),
        );
        assert!(body.contains("<METHODCALL NAME=\"RequestStateChange\">"));
        assert!(body.contains("<LOCALINSTANCEPATH>"));
        assert!(body.contains(
            "<PARAMVALUE NAME=\"RequestedState\" PARAMTYPE=\"uint16\"><VALUE>3</VALUE></PARAMVALUE>"
        ));
        assert!(body.contains(
            "<PARAMVALUE NAME=\"Force\" PARAMTYPE=\"boolean\"><VALUE>true</VALUE></PARAMVALUE>"
        ));
    }

    #[test]
    fn methodcall_on_class_path_uses_localclasspath() {
        let path = CimObjectPath::new("CIM_Service").with_namespace("root/cimv2");
        let body = utf8(build_methodcall("StartService", &path, &[]).unwrap());
        assert!(body.contains("<LOCALCLASSPATH>"));
        assert!(body.contains("<CLASSNAME NAME=\"CIM_Service\"/>"));
    }

    #[test]
    fn methodcall_requires_a_namespace() {
        let path = CimObjectPath::new("CIM_Foo");
        assert!(build_methodcall("M", &path, &[]).is_err());
    }

    #[test]
    fn string_array_param_renders_value_array() {
        let body = utf8(
            build_imethodcall(
                "GetInstance",
                "root/cimv2",
                &[(
                    "PropertyList",
                    OpParam::StringArray(vec!["Name".into(), "Index".into()]),
                )],
            )
            .unwrap(),
        );
        assert_eq!(
            body.contains(
                "<IPARAMVALUE NAME=\"PropertyList\"><VALUE.ARRAY><VALUE>Name</VALUE><VALUE>Index</VALUE></VALUE.ARRAY></IPARAMVALUE>"
            ),
            true
        );
    }
}
