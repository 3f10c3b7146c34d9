
use fixtures::*;
use pretty_assertions::assert_eq;

use wbem::{
    CimObjectPath, CimStatusCode, CimValue, EnumerateInstancesOptions, GetInstanceOptions,
    WbemError, XmlError,
};

#[test]
fn enumerate_instances_stamps_effective_namespace() {
    ensure_env_logger_initialized();
    let (mut conn, transport) = mock_connection();
    let body = format!(
        "{}{}",
        named_instance("CIM_Foo", "Name", "one"),
        named_instance("CIM_Foo", "Name", "two"),
    );
    transport.push_reply(imethod_rsp("EnumerateInstances", &body));

    let instances = conn
        .enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap();

    assert_eq!(instances.len(), 2);
    for instance in &instances {
        let path = instance.path().expect("path must be attached");
        assert_eq!(path.namespace(), Some("root/cimv2"));
        assert_eq!(path.host(), None);
        assert_eq!(path.classname(), "CIM_Foo");
    }
    assert_eq!(
        instances[0].property_value("Name"),
        Some(&CimValue::String("one".into()))
    );

    // The request itself targeted the default namespace.
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "EnumerateInstances");
    assert_eq!(requests[0].cim_object, "root/cimv2");
    assert!(requests[0].body.contains(
        "<LOCALNAMESPACEPATH><NAMESPACE NAME=\"root\"/><NAMESPACE NAME=\"cimv2\"/></LOCALNAMESPACEPATH>"
    ));
    assert!(requests[0].body.contains("<CLASSNAME NAME=\"CIM_Foo\"/>"));
}

#[test]
fn get_instance_completes_the_request_path() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp(
        "GetInstance",
        "<INSTANCE CLASSNAME=\"CIM_Foo\">\
         <PROPERTY NAME=\"Name\" TYPE=\"string\"><VALUE>a</VALUE></PROPERTY>\
         </INSTANCE>",
    ));

    let request_path =
        CimObjectPath::new("CIM_Foo").with_keybinding("Name", CimValue::String("a".into()));
    let instance = conn
        .get_instance(&request_path, None, &GetInstanceOptions::default())
        .unwrap();

    let path = instance.path().unwrap();
    assert_eq!(path.classname(), "CIM_Foo");
    assert_eq!(path.namespace(), Some("root/cimv2"));
    assert_eq!(path.host(), None);
    assert_eq!(path.keybinding("Name"), Some(&CimValue::String("a".into())));

    let request = &transport.requests()[0];
    assert!(request.body.contains("<NAMESPACE NAME=\"cimv2\"/>"));
    assert!(request.body.contains("<INSTANCENAME CLASSNAME=\"CIM_Foo\">"));
}

#[test]
fn explicit_namespace_wins_over_path_and_default() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp(
        "GetInstance",
        "<INSTANCE CLASSNAME=\"CIM_Foo\"/>",
    ));
    let path = CimObjectPath::new("CIM_Foo")
        .with_namespace("root/from_path")
        .with_keybinding("Name", CimValue::String("a".into()));

    let instance = conn
        .get_instance(&path, Some("root/explicit"), &GetInstanceOptions::default())
        .unwrap();

    assert_eq!(instance.path().unwrap().namespace(), Some("root/explicit"));
    assert!(transport.requests()[0]
        .body
        .contains("<NAMESPACE NAME=\"explicit\"/>"));
}

#[test]
fn path_namespace_wins_over_default() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp(
        "GetInstance",
        "<INSTANCE CLASSNAME=\"CIM_Foo\"/>",
    ));
    let path = CimObjectPath::new("CIM_Foo")
        .with_namespace("root/from_path")
        .with_keybinding("Name", CimValue::String("a".into()));

    let instance = conn
        .get_instance(&path, None, &GetInstanceOptions::default())
        .unwrap();

    assert_eq!(instance.path().unwrap().namespace(), Some("root/from_path"));
    assert!(transport.requests()[0]
        .body
        .contains("<NAMESPACE NAME=\"from_path\"/>"));
}

#[test]
fn server_error_is_surfaced_with_diagnostics() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(error_rsp("GetInstance", 6, "no such instance"));

    let path = CimObjectPath::new("CIM_Foo").with_keybinding("Name", CimValue::String("a".into()));
    let err = conn
        .get_instance(&path, None, &GetInstanceOptions::default())
        .unwrap_err();

    let cim = err.cim_error().expect("expected a server status error");
    assert_eq!(cim.status(), Some(CimStatusCode::NotFound));
    assert_eq!(cim.description(), Some("no such instance"));
    // Post-mortem enrichment: both the request and the raw reply travel
    // with the error.
    assert!(err.request_xml().unwrap().contains("GetInstance"));
    assert!(err.reply_xml().unwrap().contains("ERROR CODE=\"6\""));
}

#[test]
fn void_operation_rejects_unexpected_output() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp_raw(
        "DeleteInstance",
        "<PARAMVALUE NAME=\"Bogus\" PARAMTYPE=\"boolean\"><VALUE>true</VALUE></PARAMVALUE>",
    ));

    let path = CimObjectPath::new("CIM_Foo").with_keybinding("Name", CimValue::String("a".into()));
    let err = conn.delete_instance(&path, None).unwrap_err();
    assert!(
        matches!(err, WbemError::Protocol { .. }),
        "expected protocol error, got {err:?}"
    );
}

#[test]
fn void_operation_rejects_unexpected_ireturnvalue() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp("DeleteInstance", ""));

    let path = CimObjectPath::new("CIM_Foo").with_keybinding("Name", CimValue::String("a".into()));
    let err = conn.delete_instance(&path, None).unwrap_err();
    assert!(matches!(err, WbemError::Protocol { .. }));
}

#[test]
fn delete_instance_accepts_bare_response() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(void_rsp("DeleteInstance"));

    let path = CimObjectPath::new("CIM_Foo").with_keybinding("Name", CimValue::String("a".into()));
    conn.delete_instance(&path, None).unwrap();
}

#[test]
fn missing_ireturnvalue_means_empty_enumeration() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(void_rsp("EnumerateInstances"));

    let instances = conn
        .enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap();
    assert!(instances.is_empty());
}

#[test]
fn malformed_reply_kinds_are_distinguished() {
    // Invalid UTF-8 byte.
    let (mut conn, transport) = mock_connection();
    transport.push_reply(b"<VALUE>\x80</VALUE>".to_vec());
    let err = conn
        .enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap_err();
    match err {
        WbemError::MalformedXml {
            source: XmlError::Utf8 { .. },
            ..
        } => {}
        other => panic!("expected Utf8 kind, got {other:?}"),
    }

    // Well-formed UTF-8, forbidden XML character.
    let (mut conn, transport) = mock_connection();
    transport.push_reply(b"<VALUE>\x00</VALUE>".to_vec());
    let err = conn
        .enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap_err();
    match err {
        WbemError::MalformedXml {
            source: XmlError::InvalidXmlChar { codepoint: 0, .. },
            ..
        } => {}
        other => panic!("expected InvalidXmlChar kind, got {other:?}"),
    }

    // Not XML at all.
    let (mut conn, transport) = mock_connection();
    transport.push_reply(b"this is not xml".to_vec());
    let err = conn
        .enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        WbemError::MalformedXml {
            source: XmlError::Syntax { .. },
            ..
        }
    ));
}

#[test]
fn create_instance_returns_stamped_path() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp(
        "CreateInstance",
        "<INSTANCENAME CLASSNAME=\"CIM_Foo\">\
         <KEYBINDING NAME=\"Name\"><KEYVALUE VALUETYPE=\"string\">new</KEYVALUE></KEYBINDING>\
         </INSTANCENAME>",
    ));

    let instance = wbem::CimInstance::new("CIM_Foo")
        .with_property(wbem::CimProperty::string("Name", "new"));
    let path = conn.create_instance(&instance, None).unwrap();
    assert_eq!(path.namespace(), Some("root/cimv2"));
    assert_eq!(path.keybinding("Name"), Some(&CimValue::String("new".into())));
    assert!(transport.requests()[0]
        .body
        .contains("<IPARAMVALUE NAME=\"NewInstance\"><INSTANCE CLASSNAME=\"CIM_Foo\">"));
}

#[test]
fn modify_instance_without_path_fails_before_any_request() {
    let (mut conn, transport) = mock_connection();
    let instance = wbem::CimInstance::new("CIM_Foo");
    let err = conn.modify_instance(&instance, None, None).unwrap_err();
    assert!(matches!(err, WbemError::Parameter(_)));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn invoke_method_round_trip() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(envelope(
        "<METHODRESPONSE NAME=\"RequestStateChange\">\
         <RETURNVALUE PARAMTYPE=\"uint32\"><VALUE>0</VALUE></RETURNVALUE>\
         <PARAMVALUE NAME=\"Job\" PARAMTYPE=\"reference\">\
         <VALUE.REFERENCE><CLASSNAME NAME=\"CIM_Job\"/></VALUE.REFERENCE>\
         </PARAMVALUE>\
         </METHODRESPONSE>",
    ));

    let target = CimObjectPath::new("CIM_Service")
        .with_keybinding("Name", CimValue::String("svc1".into()));
    let (return_value, out_params) = conn
        .invoke_method(
            "RequestStateChange",
            target,
            vec![("RequestedState".to_owned(), CimValue::Uint16(3))],
        )
        .unwrap();

    assert_eq!(return_value, Some(CimValue::Uint32(0)));
    assert_eq!(out_params.len(), 1);
    assert!(matches!(
        out_params.get("Job"),
        Some(CimValue::Reference(_))
    ));

    let request = &transport.requests()[0];
    assert_eq!(request.method, "RequestStateChange");
    assert!(request.body.contains("<METHODCALL NAME=\"RequestStateChange\">"));
    assert!(request.body.contains("<LOCALINSTANCEPATH>"));
    assert!(request.body.contains(
        "<PARAMVALUE NAME=\"RequestedState\" PARAMTYPE=\"uint16\"><VALUE>3</VALUE></PARAMVALUE>"
    ));
}

#[test]
fn get_class_parses_declaration() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp(
        "GetClass",
        "<CLASS NAME=\"CIM_Foo\" SUPERCLASS=\"CIM_ManagedElement\">\
         <PROPERTY NAME=\"Name\" TYPE=\"string\"/>\
         <METHOD NAME=\"Reset\" TYPE=\"uint32\"/>\
         </CLASS>",
    ));

    let class = conn
        .get_class("CIM_Foo", None, &wbem::GetClassOptions::default())
        .unwrap();
    assert_eq!(class.classname(), "CIM_Foo");
    assert_eq!(class.superclass(), Some("CIM_ManagedElement"));
    assert!(class.methods().contains("Reset"));
}

#[test]
fn enumerate_qualifiers_parses_declarations() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp(
        "EnumerateQualifiers",
        "<QUALIFIER.DECLARATION NAME=\"Key\" TYPE=\"boolean\" OVERRIDABLE=\"false\">\
         <SCOPE PROPERTY=\"true\" REFERENCE=\"true\"/>\
         <VALUE>false</VALUE>\
         </QUALIFIER.DECLARATION>",
    ));

    let decls = conn.enumerate_qualifiers(None).unwrap();
    assert_eq!(decls.len(), 1);
    assert_eq!(decls[0].name(), "Key");
    assert_eq!(decls[0].overridable(), Some(false));
}

#[test]
fn associators_keep_server_declared_host() {
    let (mut conn, transport) = mock_connection();
    let body = "<VALUE.OBJECTWITHPATH>\
        <INSTANCEPATH>\
        <NAMESPACEPATH><HOST>other.example.com</HOST>\
        <LOCALNAMESPACEPATH><NAMESPACE NAME=\"root\"/><NAMESPACE NAME=\"other\"/></LOCALNAMESPACEPATH>\
        </NAMESPACEPATH>\
        <INSTANCENAME CLASSNAME=\"CIM_Bar\">\
        <KEYBINDING NAME=\"Name\"><KEYVALUE VALUETYPE=\"string\">b</KEYVALUE></KEYBINDING>\
        </INSTANCENAME>\
        </INSTANCEPATH>\
        <INSTANCE CLASSNAME=\"CIM_Bar\"/>\
        </VALUE.OBJECTWITHPATH>";
    transport.push_reply(imethod_rsp("Associators", body));

    let source =
        CimObjectPath::new("CIM_Foo").with_keybinding("Name", CimValue::String("a".into()));
    let objects = conn
        .associators(source, None, &wbem::AssociatorOptions::default())
        .unwrap();
    assert_eq!(objects.len(), 1);
    let path = objects[0].path().unwrap();
    // Association results may span hosts; the server-declared host and
    // namespace are preserved, never locally overwritten.
    assert_eq!(path.host(), Some("other.example.com"));
    assert_eq!(path.namespace(), Some("root/other"));
}

#[test]
fn exec_query_stamps_namespace_only_where_a_path_exists() {
    let (mut conn, transport) = mock_connection();
    let body = "<VALUE.OBJECT><INSTANCE CLASSNAME=\"CIM_Foo\"/></VALUE.OBJECT>\
        <VALUE.OBJECTWITHLOCALPATH>\
        <LOCALINSTANCEPATH>\
        <LOCALNAMESPACEPATH><NAMESPACE NAME=\"root\"/><NAMESPACE NAME=\"cimv2\"/></LOCALNAMESPACEPATH>\
        <INSTANCENAME CLASSNAME=\"CIM_Foo\">\
        <KEYBINDING NAME=\"Name\"><KEYVALUE VALUETYPE=\"string\">a</KEYVALUE></KEYBINDING>\
        </INSTANCENAME>\
        </LOCALINSTANCEPATH>\
        <INSTANCE CLASSNAME=\"CIM_Foo\"/>\
        </VALUE.OBJECTWITHLOCALPATH>";
    transport.push_reply(imethod_rsp("ExecQuery", body));

    let instances = conn
        .exec_query("WQL", "SELECT * FROM CIM_Foo", None)
        .unwrap();
    assert_eq!(instances.len(), 2);
    assert!(instances[0].path().is_none());
    assert_eq!(
        instances[1].path().unwrap().namespace(),
        Some("root/cimv2")
    );
}

#[test]
fn recorder_sees_every_call_exactly_once_in_order() {
    let (mut conn, transport) = mock_connection();
    let recorder = TestRecorder::new();
    conn.add_recorder(Box::new(recorder.clone()));

    transport.push_reply(imethod_rsp(
        "EnumerateInstances",
        &named_instance("CIM_Foo", "Name", "one"),
    ));
    conn.enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap();
    assert_eq!(
        recorder.events(),
        vec!["reset", "call:EnumerateInstances", "result:ok", "record"]
    );

    // The protocol also runs, once, for failing calls.
    transport.push_reply(error_rsp("EnumerateInstances", 1, "boom"));
    let _ = conn
        .enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap_err();
    assert_eq!(
        recorder.events()[4..],
        ["reset", "call:EnumerateInstances", "result:err", "record"]
    );
}

#[test]
fn transport_failure_carries_the_request() {
    let (mut conn, transport) = mock_connection();
    transport.push_transport_error(wbem::TransportError::Connect {
        url: "http://cimom.test:5988/cimom".into(),
        reason: "connection refused".into(),
    });

    let err = conn
        .enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap_err();
    match &err {
        WbemError::Transport { .. } => {
            assert!(err.request_xml().unwrap().contains("EnumerateInstances"));
            assert!(err.reply_xml().is_none());
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[test]
fn diagnostic_state_tracks_last_round_trip() {
    let (mut conn, transport) = mock_connection();
    let reply = imethod_rsp("EnumerateInstances", "");
    let reply_len = reply.len();
    transport.push_reply(reply);

    conn.enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default())
        .unwrap();

    let last = conn.last_operation();
    assert!(last.raw_request.as_ref().unwrap().contains("EnumerateInstances"));
    assert_eq!(last.reply_len, reply_len);
    assert!(last.request_len > 0);
    assert!(last.duration.is_some());
}
