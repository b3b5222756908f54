use crate::{compile, Connection, Error, RbacAction, Unsupported};
use http::Method;
use meshcfg_core::{
    http_route::{HeaderMatch, HttpRouteMatch, PathMatch},
    IdError, Intention, IntentionAction,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

fn ixn(src_ns: &str, src: &str, action: IntentionAction, precedence: i32) -> Intention {
    Intention {
        id: String::new(),
        source_ns: src_ns.to_string(),
        source_name: src.to_string(),
        destination_ns: "default".to_string(),
        destination_name: "api".to_string(),
        action,
        precedence,
        route_matches: vec![],
    }
}

fn peer(ns: &str, svc: &str) -> Connection {
    Connection::from_peer(format!(
        "spiffe://11111111-2222-3333-4444-555555555555.consul/ns/{ns}/dc/dc1/svc/{svc}"
    ))
}

/// Scans intentions highest-precedence first; the first match decides.
fn reference_decision(
    intentions: &[Intention],
    default_action: IntentionAction,
    is_l7: bool,
    conn: &Connection,
) -> IntentionAction {
    for ixn in intentions {
        let pattern = ixn.source_identity().unwrap();
        let identity_matches = conn
            .peer_identity
            .as_deref()
            .map(|uri| pattern.matches(uri))
            .unwrap_or(false);
        if !identity_matches {
            continue;
        }
        if is_l7
            && !ixn.route_matches.is_empty()
            && !ixn.route_matches.iter().any(|m| route_matches(m, conn))
        {
            continue;
        }
        return ixn.action;
    }
    default_action
}

fn route_matches(m: &HttpRouteMatch, conn: &Connection) -> bool {
    // Without HTTP attributes, every clause sees a missing value.
    let req = conn.http.as_ref();
    let path = req.map(|r| r.path.as_str());
    let path_ok = match &m.path {
        None => true,
        Some(PathMatch::Exact(p)) => path == Some(p.as_str()),
        Some(PathMatch::Prefix(p)) => path.map(|v| v.starts_with(p.as_str())).unwrap_or(false),
        Some(PathMatch::Regex(_)) => unimplemented!("not generated"),
    };
    let headers_ok = m.headers.iter().all(|h| {
        let value = req
            .and_then(|r| r.headers.get(h.name.as_str()))
            .and_then(|v| v.to_str().ok());
        let matched = if h.present {
            value.is_some()
        } else if let Some(exact) = &h.exact {
            value == Some(exact.as_str())
        } else {
            unimplemented!("not generated")
        };
        matched != h.invert
    });
    let method_ok = m.methods.is_empty()
        || req
            .map(|r| m.methods.iter().any(|x| x == r.method.as_str()))
            .unwrap_or(false);
    path_ok && headers_ok && method_ok
}

#[test]
fn no_intentions_defers_to_default() {
    let policy = compile(&[], IntentionAction::Deny, false).unwrap();
    assert_eq!(policy.action, RbacAction::Allow);
    assert!(policy.rules.is_empty());
    assert_eq!(policy.decide(&peer("default", "web")), IntentionAction::Deny);

    let policy = compile(&[], IntentionAction::Allow, false).unwrap();
    assert_eq!(policy.action, RbacAction::Deny);
    assert!(policy.rules.is_empty());
    assert_eq!(policy.decide(&peer("default", "web")), IntentionAction::Allow);
}

#[test]
fn default_deny_wildcard_allow() {
    let intentions = [ixn("*", "*", IntentionAction::Allow, 1)];
    let policy = compile(&intentions, IntentionAction::Deny, false).unwrap();

    assert_eq!(policy.action, RbacAction::Allow);
    assert_eq!(policy.rules.len(), 1);
    assert_eq!(
        policy.to_string(),
        "action: ALLOW\n\
         compiled-intentions-0: \
         principal=matches(connection.uri_san_peer_certificate, '^spiffe://[^/]+/ns/[^/]+/dc/[^/]+/svc/[^/]+$') \
         permission=true"
    );
    assert_eq!(policy.decide(&peer("default", "web")), IntentionAction::Allow);
    assert_eq!(policy.decide(&peer("other", "db")), IntentionAction::Allow);
    assert_eq!(policy.decide(&Connection::default()), IntentionAction::Deny);
}

#[test]
fn deny_between_allows_is_folded() {
    let intentions = [
        ixn("default", "web", IntentionAction::Allow, 2),
        ixn("*", "*", IntentionAction::Deny, 1),
        ixn("*", "*", IntentionAction::Allow, 0),
    ];
    let policy = compile(&intentions, IntentionAction::Deny, false).unwrap();

    assert_eq!(policy.action, RbacAction::Allow);
    assert_eq!(policy.rules.len(), 2);
    assert_eq!(policy.decide(&peer("default", "web")), IntentionAction::Allow);
    assert_eq!(policy.decide(&peer("default", "other")), IntentionAction::Deny);
    assert_eq!(policy.decide(&peer("other", "web")), IntentionAction::Deny);

    // The wildcard allow is excluded by the outranking wildcard deny.
    assert!(!policy.rules[1].matches(&peer("default", "web")));
    assert!(!policy.rules[1].matches(&peer("default", "other")));
}

#[rstest]
#[case::exact_deny_overrides_namespace_allow(
    vec![
        ixn("default", "web", IntentionAction::Deny, 9),
        ixn("default", "*", IntentionAction::Allow, 8),
    ],
    IntentionAction::Deny,
    &[("default", "web", IntentionAction::Deny), ("default", "db", IntentionAction::Allow), ("other", "db", IntentionAction::Deny)],
)]
#[case::block_list(
    vec![
        ixn("default", "web", IntentionAction::Allow, 9),
        ixn("default", "*", IntentionAction::Deny, 8),
    ],
    IntentionAction::Allow,
    &[("default", "web", IntentionAction::Allow), ("default", "db", IntentionAction::Deny), ("other", "db", IntentionAction::Allow)],
)]
#[case::trailing_default_action_evaporates(
    vec![
        ixn("default", "web", IntentionAction::Allow, 9),
        ixn("*", "*", IntentionAction::Deny, 1),
    ],
    IntentionAction::Deny,
    &[("default", "web", IntentionAction::Allow), ("default", "db", IntentionAction::Deny)],
)]
fn decisions(
    #[case] intentions: Vec<Intention>,
    #[case] default_action: IntentionAction,
    #[case] expected: &[(&str, &str, IntentionAction)],
) {
    let policy = compile(&intentions, default_action, false).unwrap();
    assert_eq!(policy.action, RbacAction::for_default(default_action));
    for (ns, svc, action) in expected {
        assert_eq!(policy.decide(&peer(ns, svc)), *action, "{ns}/{svc}");
    }
}

#[test]
fn single_action_invariant() {
    let intentions = [
        ixn("default", "web", IntentionAction::Deny, 5),
        ixn("default", "*", IntentionAction::Allow, 4),
        ixn("*", "*", IntentionAction::Deny, 3),
    ];
    // Only the single allow survives in default-deny mode, and only the two
    // denies survive in default-allow mode.
    let policy = compile(&intentions, IntentionAction::Deny, false).unwrap();
    assert_eq!(policy.rules.len(), 1);
    let policy = compile(&intentions, IntentionAction::Allow, false).unwrap();
    assert_eq!(policy.rules.len(), 2);
}

#[test]
fn l7_allow_is_scoped_to_routes() {
    let mut admin = ixn("default", "web", IntentionAction::Allow, 9);
    admin.route_matches = vec![HttpRouteMatch {
        path: Some(PathMatch::Prefix("/admin".into())),
        methods: vec!["GET".into()],
        ..Default::default()
    }];
    let policy = compile(&[admin.clone()], IntentionAction::Deny, true).unwrap();

    let web = peer("default", "web");
    assert_eq!(
        policy.decide(&web.clone().with_request(Method::GET, "/admin/x")),
        IntentionAction::Allow
    );
    assert_eq!(
        policy.decide(&web.clone().with_request(Method::POST, "/admin/x")),
        IntentionAction::Deny
    );
    assert_eq!(
        policy.decide(&web.clone().with_request(Method::GET, "/")),
        IntentionAction::Deny
    );

    // Route matches are ignored for L4 policies.
    let policy = compile(&[admin], IntentionAction::Deny, false).unwrap();
    assert_eq!(policy.decide(&web), IntentionAction::Allow);
}

#[test]
fn l7_deny_excludes_only_its_routes() {
    let mut deny_admin = ixn("default", "web", IntentionAction::Deny, 9);
    deny_admin.route_matches = vec![HttpRouteMatch {
        path: Some(PathMatch::Prefix("/admin".into())),
        ..Default::default()
    }];
    let intentions = [deny_admin, ixn("default", "*", IntentionAction::Allow, 8)];
    let policy = compile(&intentions, IntentionAction::Deny, true).unwrap();

    assert_eq!(policy.rules.len(), 1);
    let web = peer("default", "web");
    assert_eq!(
        policy.decide(&web.clone().with_request(Method::GET, "/admin")),
        IntentionAction::Deny
    );
    assert_eq!(
        policy.decide(&web.with_request(Method::GET, "/public")),
        IntentionAction::Allow
    );
    assert_eq!(
        policy.decide(&peer("default", "db").with_request(Method::GET, "/admin")),
        IntentionAction::Allow
    );
}

#[test]
fn compilation_does_not_modify_input() {
    let intentions = vec![
        ixn("default", "web", IntentionAction::Allow, 2),
        ixn("*", "*", IntentionAction::Deny, 1),
        ixn("*", "*", IntentionAction::Allow, 0),
    ];
    let before = intentions.clone();
    let first = compile(&intentions, IntentionAction::Deny, false).unwrap();
    let second = compile(&intentions, IntentionAction::Deny, false).unwrap();
    assert_eq!(intentions, before);
    assert_eq!(first, second);
}

#[test]
fn concurrent_compilation() {
    let intentions = std::sync::Arc::new(vec![
        ixn("default", "web", IntentionAction::Deny, 2),
        ixn("*", "*", IntentionAction::Allow, 1),
    ]);
    let expected = compile(&intentions, IntentionAction::Deny, false).unwrap();
    let handles = (0..8)
        .map(|_| {
            let intentions = intentions.clone();
            std::thread::spawn(move || compile(&intentions, IntentionAction::Deny, false).unwrap())
        })
        .collect::<Vec<_>>();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}

#[test]
fn rejects_equal_precedence() {
    let intentions = [
        ixn("default", "web", IntentionAction::Allow, 9),
        ixn("default", "db", IntentionAction::Deny, 9),
    ];
    let err = compile(&intentions, IntentionAction::Deny, false).unwrap_err();
    assert!(
        matches!(
            err,
            Error::InvariantViolation {
                index: 1,
                previous: 9,
                precedence: 9
            }
        ),
        "{err}"
    );
}

#[test]
fn rejects_ascending_precedence() {
    let intentions = [
        ixn("*", "*", IntentionAction::Allow, 1),
        ixn("default", "web", IntentionAction::Deny, 9),
    ];
    assert!(matches!(
        compile(&intentions, IntentionAction::Deny, false),
        Err(Error::InvariantViolation { index: 1, .. })
    ));
}

#[test]
fn rejects_unexpressible_wildcards() {
    let intentions = [ixn("*", "web", IntentionAction::Allow, 9)];
    let err = compile(&intentions, IntentionAction::Deny, false).unwrap_err();
    assert!(matches!(
        err,
        Error::Compilation {
            index: 0,
            reason: Unsupported::Identity(IdError::UnsupportedWildcard { .. })
        }
    ));
}

#[test]
fn rejects_unsupported_l7_clause_only_in_l7_mode() {
    let mut bad = ixn("default", "web", IntentionAction::Allow, 9);
    bad.route_matches = vec![HttpRouteMatch {
        headers: vec![HeaderMatch {
            name: "x-a".into(),
            ..Default::default()
        }],
        ..Default::default()
    }];
    let intentions = [bad];
    assert!(matches!(
        compile(&intentions, IntentionAction::Deny, true),
        Err(Error::Compilation {
            index: 0,
            reason: Unsupported::HeaderMatchKind(_)
        })
    ));
    assert!(compile(&intentions, IntentionAction::Deny, false).is_ok());
}

const SOURCES: &[(&str, &str)] = &[
    ("*", "*"),
    ("default", "*"),
    ("default", "web"),
    ("default", "api"),
    ("other", "*"),
    ("other", "web"),
];

const PEERS: &[(&str, &str)] = &[
    ("default", "web"),
    ("default", "api"),
    ("default", "db"),
    ("other", "web"),
    ("other", "db"),
];

const REQUESTS: &[(&str, &str)] = &[("GET", "/admin/users"), ("POST", "/api/v1"), ("GET", "/")];

fn route_match() -> impl Strategy<Value = HttpRouteMatch> {
    (
        prop::option::of(prop_oneof![
            Just(PathMatch::Prefix("/admin".to_string())),
            Just(PathMatch::Exact("/".to_string())),
            Just(PathMatch::Prefix("/api".to_string())),
        ]),
        prop::collection::vec(
            prop_oneof![
                Just(HeaderMatch::present("x-debug")),
                Just(HeaderMatch::present("x-debug").inverted()),
                Just(HeaderMatch::exact("x-tenant", "a")),
            ],
            0..2,
        ),
        prop::collection::vec(prop_oneof![Just("GET".to_string()), Just("POST".to_string())], 0..2),
    )
        .prop_map(|(path, headers, methods)| HttpRouteMatch {
            path,
            headers,
            methods,
        })
}

fn intentions() -> impl Strategy<Value = Vec<Intention>> {
    prop::collection::vec(
        (
            prop::sample::select(SOURCES),
            any::<bool>(),
            prop::collection::vec(route_match(), 0..3),
        ),
        0..8,
    )
    .prop_map(|specs| {
        let n = specs.len() as i32;
        specs
            .into_iter()
            .enumerate()
            .map(|(i, ((ns, name), allow, route_matches))| {
                let action = if allow {
                    IntentionAction::Allow
                } else {
                    IntentionAction::Deny
                };
                Intention {
                    route_matches,
                    ..ixn(ns, name, action, (n - i as i32) * 10)
                }
            })
            .collect()
    })
}

fn connections() -> Vec<Connection> {
    let mut conns = vec![
        Connection::default(),
        Connection::from_peer("spiffe://td/ns/default/svc/web"),
    ];
    for (ns, svc) in PEERS {
        conns.push(peer(ns, svc));
        for (method, path) in REQUESTS {
            let base = peer(ns, svc).with_request(method.parse().unwrap(), *path);
            conns.push(base.clone());
            let mut debug = base.clone();
            let mut tenant = base;
            if let Some(http) = debug.http.as_mut() {
                http.headers.insert("x-debug", "1".parse().unwrap());
            }
            if let Some(http) = tenant.http.as_mut() {
                http.headers.insert("x-tenant", "a".parse().unwrap());
            }
            conns.push(debug);
            conns.push(tenant);
        }
    }
    conns
}

proptest! {
    #[test]
    fn compiled_policy_agrees_with_precedence_evaluation(
        intentions in intentions(),
        default_allow in any::<bool>(),
        is_l7 in any::<bool>(),
    ) {
        let default_action = if default_allow {
            IntentionAction::Allow
        } else {
            IntentionAction::Deny
        };
        let policy = compile(&intentions, default_action, is_l7).unwrap();

        prop_assert_eq!(policy.action, RbacAction::for_default(default_action));
        let survivors = intentions
            .iter()
            .filter(|i| i.action != default_action)
            .count();
        prop_assert_eq!(policy.rules.len(), survivors);

        for conn in connections() {
            prop_assert_eq!(
                policy.decide(&conn),
                reference_decision(&intentions, default_action, is_l7, &conn),
                "{:?}",
                conn
            );
        }
    }
}
