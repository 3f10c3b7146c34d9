
use fixtures::*;
use pretty_assertions::assert_eq;

use wbem::{
    CimValue, EnumerateInstancesOptions, OpenOptions, ProtocolError, PullMode, WbemError,
};

fn open_options(page: u32) -> OpenOptions {
    OpenOptions {
        max_object_count: page,
        ..Default::default()
    }
}

#[test]
fn iter_pulls_pages_in_server_order() {
    ensure_env_logger_initialized();
    let (mut conn, transport) = mock_connection();
    let page1 = format!(
        "{}{}",
        instance_with_path("CIM_Foo", "cimom.test", "root/cimv2", 1),
        instance_with_path("CIM_Foo", "cimom.test", "root/cimv2", 2),
    );
    transport.push_reply(pull_rsp("OpenEnumerateInstances", &page1, false, Some("ctx1")));
    let page2 = instance_with_path("CIM_Foo", "cimom.test", "root/cimv2", 3);
    transport.push_reply(pull_rsp("PullInstancesWithPath", &page2, true, None));

    let results: Vec<_> = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(2),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let indexes: Vec<_> = results
        .iter()
        .map(|i| match i.property_value("Index") {
            Some(CimValue::Uint32(n)) => *n,
            other => panic!("unexpected value {other:?}"),
        })
        .collect();
    assert_eq!(indexes, vec![1, 2, 3]);

    // One open, one pull, nothing else: no pre-fetch beyond a page and no
    // close for a normally exhausted sequence.
    let methods: Vec<_> = transport.requests().iter().map(|r| r.method.clone()).collect();
    assert_eq!(methods, vec!["OpenEnumerateInstances", "PullInstancesWithPath"]);

    // The pull reuses the context and the same page size.
    let pull_body = &transport.requests()[1].body;
    assert!(pull_body.contains(
        "<IPARAMVALUE NAME=\"EnumerationContext\"><VALUE>ctx1</VALUE></IPARAMVALUE>"
    ));
    assert!(pull_body.contains(
        "<IPARAMVALUE NAME=\"MaxObjectCount\"><VALUE>2</VALUE></IPARAMVALUE>"
    ));
}

#[test]
fn fallback_probes_only_once_per_connection() {
    let (mut conn, transport) = mock_connection();

    // First call: the open probe is rejected, the traditional operation
    // answers.
    transport.push_reply(error_rsp("OpenEnumerateInstances", 7, "not supported"));
    transport.push_reply(imethod_rsp(
        "EnumerateInstances",
        &named_instance("CIM_Foo", "Name", "one"),
    ));
    let first: Vec<_> = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(10),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(conn.pull_enumeration_supported(), Some(false));

    // Second call: no probe, straight to the traditional operation.
    transport.push_reply(imethod_rsp(
        "EnumerateInstances",
        &named_instance("CIM_Foo", "Name", "two"),
    ));
    let second: Vec<_> = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(10),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(second.len(), 1);

    assert_eq!(transport.requests_for("OpenEnumerateInstances").len(), 1);
    assert_eq!(transport.requests_for("EnumerateInstances").len(), 2);
}

#[test]
fn abandoning_iteration_closes_the_session() {
    let (mut conn, transport) = mock_connection();
    let page = format!(
        "{}{}",
        instance_with_path("CIM_Foo", "cimom.test", "root/cimv2", 1),
        instance_with_path("CIM_Foo", "cimom.test", "root/cimv2", 2),
    );
    transport.push_reply(pull_rsp("OpenEnumerateInstances", &page, false, Some("ctx9")));
    transport.push_reply(void_rsp("CloseEnumeration"));

    {
        let mut iter = conn
            .iter_enumerate_instances(
                "CIM_Foo",
                None,
                &EnumerateInstancesOptions::default(),
                &open_options(2),
            )
            .unwrap();
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.property_value("Index"), Some(&CimValue::Uint32(1)));
        // Dropped here, mid-page, with the session still open.
    }

    let methods: Vec<_> = transport.requests().iter().map(|r| r.method.clone()).collect();
    assert_eq!(methods, vec!["OpenEnumerateInstances", "CloseEnumeration"]);
    let close_body = &transport.requests()[1].body;
    assert!(close_body.contains(
        "<IPARAMVALUE NAME=\"EnumerationContext\"><VALUE>ctx9</VALUE></IPARAMVALUE>"
    ));
    // The close went to the namespace the session was opened against.
    assert_eq!(transport.requests()[1].cim_object, "root/cimv2");
}

#[test]
fn exhausted_iteration_needs_no_close() {
    let (mut conn, transport) = mock_connection();
    let page = instance_with_path("CIM_Foo", "cimom.test", "root/cimv2", 1);
    transport.push_reply(pull_rsp("OpenEnumerateInstances", &page, true, None));

    let results: Vec<_> = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(5),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(transport.request_count(), 1);
}

#[test]
fn force_mode_propagates_not_supported() {
    let (mut conn, transport) = mock_connection();
    conn = conn.with_pull_mode(PullMode::Force);
    transport.push_reply(error_rsp("OpenEnumerateInstances", 7, "not supported"));

    let err = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(10),
        )
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    assert!(err.cim_error().is_some());
    // No traditional fallback was attempted.
    assert_eq!(transport.requests_for("EnumerateInstances").len(), 0);
}

#[test]
fn never_mode_skips_the_probe_entirely() {
    let (mut conn, transport) = mock_connection();
    conn = conn.with_pull_mode(PullMode::Never);
    transport.push_reply(imethod_rsp(
        "EnumerateInstances",
        &named_instance("CIM_Foo", "Name", "one"),
    ));

    let results: Vec<_> = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(10),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(transport.requests_for("OpenEnumerateInstances").len(), 0);
}

#[test]
fn filter_query_is_rejected_on_the_traditional_path() {
    let (mut conn, transport) = mock_connection();
    conn = conn.with_pull_mode(PullMode::Never);

    let open = OpenOptions {
        filter_query: Some("SELECT * FROM CIM_Foo".into()),
        filter_query_language: Some("DMTF:FQL".into()),
        max_object_count: 10,
        ..Default::default()
    };
    let err = conn
        .iter_enumerate_instances("CIM_Foo", None, &EnumerateInstancesOptions::default(), &open)
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, WbemError::Parameter(_)), "{err:?}");
    // Rejected before any network interaction.
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn zero_page_size_is_rejected_up_front() {
    let (mut conn, transport) = mock_connection();
    let err = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(0),
        )
        .err()
        .expect("expected a parameter error");
    assert!(matches!(err, WbemError::Parameter(_)));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn pull_response_must_carry_end_of_sequence() {
    let (mut conn, transport) = mock_connection();
    // Neither EndOfSequence nor EnumerationContext.
    transport.push_reply(imethod_rsp_raw(
        "OpenEnumerateInstances",
        "<IRETURNVALUE></IRETURNVALUE>",
    ));

    let err = conn
        .open_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(5),
        )
        .unwrap_err();
    match err {
        WbemError::Protocol {
            source: ProtocolError::MissingPullStatus,
            ..
        } => {}
        other => panic!("expected MissingPullStatus, got {other:?}"),
    }
}

#[test]
fn open_sequence_without_context_is_structural_error() {
    let (mut conn, transport) = mock_connection();
    // EndOfSequence=false but no context to continue with.
    transport.push_reply(pull_rsp("OpenEnumerateInstances", "", false, None));

    let err = conn
        .open_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(5),
        )
        .unwrap_err();
    match err {
        WbemError::Protocol {
            source: ProtocolError::MissingPullContext,
            ..
        } => {}
        other => panic!("expected MissingPullContext, got {other:?}"),
    }
}

#[test]
fn explicit_pull_requires_positive_page_size() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(pull_rsp(
        "OpenEnumerateInstances",
        &instance_with_path("CIM_Foo", "h", "root/cimv2", 1),
        false,
        Some("ctx1"),
    ));
    let opened = conn
        .open_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(1),
        )
        .unwrap();
    let context = opened.context.unwrap();

    let err = conn.pull_instances_with_path(&context, 0).unwrap_err();
    assert!(matches!(err, WbemError::Parameter(_)));
}

#[test]
fn query_iteration_drains_all_pages_eagerly() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(imethod_rsp_raw(
        "OpenQueryInstances",
        "<IRETURNVALUE>\
         <INSTANCE CLASSNAME=\"CIM_Foo\">\
         <PROPERTY NAME=\"Index\" TYPE=\"uint32\"><VALUE>1</VALUE></PROPERTY>\
         </INSTANCE>\
         </IRETURNVALUE>\
         <PARAMVALUE NAME=\"QueryResultClass\">\
         <CLASS NAME=\"CIM_Foo\"><PROPERTY NAME=\"Index\" TYPE=\"uint32\"/></CLASS>\
         </PARAMVALUE>\
         <PARAMVALUE NAME=\"EnumerationContext\" PARAMTYPE=\"string\"><VALUE>qctx</VALUE></PARAMVALUE>\
         <PARAMVALUE NAME=\"EndOfSequence\" PARAMTYPE=\"boolean\"><VALUE>false</VALUE></PARAMVALUE>",
    ));
    transport.push_reply(imethod_rsp_raw(
        "PullInstances",
        "<IRETURNVALUE>\
         <INSTANCE CLASSNAME=\"CIM_Foo\">\
         <PROPERTY NAME=\"Index\" TYPE=\"uint32\"><VALUE>2</VALUE></PROPERTY>\
         </INSTANCE>\
         </IRETURNVALUE>\
         <PARAMVALUE NAME=\"EndOfSequence\" PARAMTYPE=\"boolean\"><VALUE>true</VALUE></PARAMVALUE>",
    ));

    let result = conn
        .iter_query_instances(
            "DMTF:CQL",
            "SELECT * FROM CIM_Foo",
            None,
            Some(true),
            &open_options(1),
        )
        .unwrap();

    // Both pages were fetched before the result was handed back.
    let methods: Vec<_> = transport.requests().iter().map(|r| r.method.clone()).collect();
    assert_eq!(methods, vec!["OpenQueryInstances", "PullInstances"]);

    assert_eq!(
        result.query_result_class().map(|c| c.classname().to_owned()),
        Some("CIM_Foo".to_owned())
    );
    let instances: Vec<_> = result.collect();
    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|i| i.path().is_none()));
}

#[test]
fn query_iteration_falls_back_to_exec_query() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(error_rsp("OpenQueryInstances", 7, "not supported"));
    transport.push_reply(imethod_rsp(
        "ExecQuery",
        "<VALUE.OBJECT><INSTANCE CLASSNAME=\"CIM_Foo\"/></VALUE.OBJECT>",
    ));

    let result = conn
        .iter_query_instances(
            "WQL",
            "SELECT * FROM CIM_Foo",
            None,
            None,
            &open_options(10),
        )
        .unwrap();
    assert!(result.query_result_class().is_none());
    assert_eq!(result.count(), 1);

    // Second query call skips the probe.
    transport.push_reply(imethod_rsp(
        "ExecQuery",
        "<VALUE.OBJECT><INSTANCE CLASSNAME=\"CIM_Foo\"/></VALUE.OBJECT>",
    ));
    let again = conn
        .iter_query_instances(
            "WQL",
            "SELECT * FROM CIM_Foo",
            None,
            None,
            &open_options(10),
        )
        .unwrap();
    assert_eq!(again.count(), 1);
    assert_eq!(transport.requests_for("OpenQueryInstances").len(), 1);
    assert_eq!(transport.requests_for("ExecQuery").len(), 2);
}

#[test]
fn explicit_close_consumes_the_context() {
    let (mut conn, transport) = mock_connection();
    transport.push_reply(pull_rsp(
        "OpenEnumerateInstances",
        &instance_with_path("CIM_Foo", "h", "root/cimv2", 1),
        false,
        Some("ctx5"),
    ));
    transport.push_reply(void_rsp("CloseEnumeration"));

    let mut iter = conn
        .iter_enumerate_instances(
            "CIM_Foo",
            None,
            &EnumerateInstancesOptions::default(),
            &open_options(1),
        )
        .unwrap();
    let _ = iter.next().unwrap().unwrap();
    iter.close().unwrap();
    drop(iter);

    // Exactly one CloseEnumeration, not two: close() invalidated the
    // context before the drop ran.
    assert_eq!(transport.requests_for("CloseEnumeration").len(), 1);
}
