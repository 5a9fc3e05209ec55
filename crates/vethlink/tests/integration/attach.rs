//! Attach and detach against real namespaces.
//!
//! Each test builds a private "host" namespace holding the bridge and enters
//! it on the test thread, so nothing touches the real host namespace.

use vethlink::attach::{
    AttachConfig, AttachError, AttachRequest, Attacher, DetachRequest, ForwardingDeviceKind,
    NamespaceExecutor, NoopAnnouncer, ThreadExecutor,
};
use vethlink::netlink::namespace;

use crate::common::{TestNamespace, TestResult, init_tracing};

fn attacher() -> Result<Attacher<ThreadExecutor>, Box<dyn std::error::Error>> {
    let attacher = Attacher::new(ThreadExecutor::new()?, AttachConfig::default())?;
    Ok(attacher.with_announcer(NoopAnnouncer))
}

#[tokio::test]
async fn test_attach_to_bridge_and_detach() -> TestResult {
    require_root!();
    init_tracing();

    let host = TestNamespace::new("host")?;
    let container = TestNamespace::new("ctr")?;
    host.add_bridge("weave", 1376)?;
    let _in_host = host.enter()?;

    let attacher = attacher()?;
    let ns = container.handle()?;
    let request = AttachRequest::new("abcdefgh", "ethwe", "weave")
        .multicast_route(true)
        .addresses(["10.32.0.7/12".parse()?]);

    let outcome = attacher.attach(&ns, &request).await?;
    let pair = outcome.created.expect("pair created");
    assert_eq!(pair.local, "vethplabcde");
    assert_eq!(pair.device_kind, ForwardingDeviceKind::KernelBridge);
    assert_eq!(pair.mtu, Some(1376));

    let conn = host.connection()?;
    let bridge = conn.get_link_by_name("weave").await?.expect("bridge");
    let local = conn.get_link_by_name("vethplabcde").await?.expect("local end");
    assert_eq!(local.master(), Some(bridge.ifindex()));
    assert!(local.is_up());
    assert!(conn.get_link_by_name("vethpgabcde").await?.is_none());

    assert_eq!(container.ipv4_addrs("ethwe")?, vec!["10.32.0.7/12".to_string()]);
    let routes = container.exec("ip", &["-4", "route", "show", "224.0.0.0/4"])?;
    assert!(routes.contains("dev ethwe"), "route missing: {routes}");
    let reachable = container.exec("cat", &["/proc/sys/net/ipv4/neigh/ethwe/base_reachable_time"])?;
    assert_eq!(reachable.trim(), "5");

    // Reattach converges without creating anything.
    let again = attacher.attach(&ns, &request).await?;
    assert!(again.created.is_none());
    assert!(again.added.is_empty());

    let detached = attacher
        .detach(
            &ns,
            &DetachRequest::new("abcdefgh", "ethwe").cidrs(["10.32.0.7/12".parse()?]),
        )
        .await?;
    assert!(detached.deleted);
    assert!(!container.has_link("ethwe"));
    assert!(conn.get_link_by_name("vethplabcde").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_attaches_share_host_connection() -> TestResult {
    require_root!();
    init_tracing();

    let host = TestNamespace::new("host-many")?;
    let first = TestNamespace::new("ctr-a")?;
    let second = TestNamespace::new("ctr-b")?;
    let third = TestNamespace::new("ctr-c")?;
    host.add_bridge("weave", 1376)?;
    let _in_host = host.enter()?;

    let attacher = attacher()?;
    let (ns_a, ns_b, ns_c) = (first.handle()?, second.handle()?, third.handle()?);
    let req_a = AttachRequest::new("aaaaa1", "ethwe", "weave")
        .addresses(["10.32.0.1/12".parse()?]);
    let req_b = AttachRequest::new("bbbbb2", "ethwe", "weave")
        .addresses(["10.32.0.2/12".parse()?]);
    let req_c = AttachRequest::new("ccccc3", "ethwe", "weave")
        .addresses(["10.32.0.3/12".parse()?]);

    let attached = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        tokio::join!(
            attacher.attach(&ns_a, &req_a),
            attacher.attach(&ns_b, &req_b),
            attacher.attach(&ns_c, &req_c),
        )
    })
    .await?;
    for outcome in [attached.0, attached.1, attached.2] {
        assert!(outcome?.created.is_some());
    }

    let expected = [
        (&first, "10.32.0.1/12"),
        (&second, "10.32.0.2/12"),
        (&third, "10.32.0.3/12"),
    ];
    for (container, addr) in expected {
        assert_eq!(container.ipv4_addrs("ethwe")?, vec![addr.to_string()]);
    }
    for local in ["vethplaaaaa", "vethplbbbbb", "vethplccccc"] {
        assert!(host.has_link(local), "{local} missing");
    }

    Ok(())
}

#[tokio::test]
async fn test_unsupported_device_leaves_nothing() -> TestResult {
    require_root!();
    init_tracing();

    let host = TestNamespace::new("host-dummy")?;
    let container = TestNamespace::new("ctr-dummy")?;
    host.exec("ip", &["link", "add", "weave", "type", "dummy"])?;
    let _in_host = host.enter()?;

    let attacher = attacher()?;
    let ns = container.handle()?;

    let err = attacher
        .attach(&ns, &AttachRequest::new("abcdefgh", "ethwe", "weave"))
        .await
        .unwrap_err();
    assert!(matches!(err, AttachError::UnsupportedDevice { ref kind, .. } if kind == "dummy"));

    assert!(!host.has_link("vethplabcde"));
    assert!(!host.has_link("vethpgabcde"));
    assert!(!container.has_link("ethwe"));

    Ok(())
}

#[tokio::test]
async fn test_missing_device() -> TestResult {
    require_root!();

    let host = TestNamespace::new("host-empty")?;
    let container = TestNamespace::new("ctr-empty")?;
    let _in_host = host.enter()?;

    let err = attacher()?
        .attach(
            &container.handle()?,
            &AttachRequest::new("abcdefgh", "ethwe", "weave"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AttachError::DeviceNotFound { .. }));

    Ok(())
}

#[tokio::test]
async fn test_executor_restores_namespace() -> TestResult {
    require_root!();

    let container = TestNamespace::new("restore")?;
    let executor = ThreadExecutor::new()?;
    let ns = container.handle()?;
    let before = namespace::current()?;

    let inside = executor
        .with_namespace(&ns, |_conn| async {
            let current = namespace::current().map_err(AttachError::Namespace)?;
            Ok(current.id().map_err(AttachError::Namespace)?)
        })
        .await?;
    assert_eq!(inside, ns.id()?);
    assert!(namespace::current()?.same_as(&before)?);

    let err = executor
        .with_namespace(&ns, |_conn| async {
            Err::<(), _>(AttachError::InterfaceNotFound {
                name: "ethwe".into(),
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AttachError::InterfaceNotFound { .. }));
    assert!(namespace::current()?.same_as(&before)?);

    Ok(())
}
