//! Unit tests for context lifecycle and command dispatch.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::support::{
    Journal, OnAcquire, OnRelease, Script, scripted_builder, scripted_manager, users_service,
};
use crate::dispatch::{dotted, from_fn};
use crate::{
    Args, ContextHooks, DalError, DataManager, Disposition, ExecutionContext, ExitSource, Fault,
    FnMiddleware, FnResource, LifecycleState, Meta, MethodCall, Request, Resource,
    ResourceProvider, Service, ValueResource, active_depth,
};

#[fixture]
fn journal() -> Journal {
    Journal::default()
}

fn dal_error(fault: &Fault) -> &DalError {
    fault.dal_error().expect("fault should carry a DalError")
}

// -----------------------------------------------------------------------------
// Context lifecycle
// -----------------------------------------------------------------------------

#[rstest]
fn clean_contexts_have_no_exit_errors(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[("db", Script::well_behaved()), ("cache", Script::well_behaved())],
        &[],
    );
    let context = manager.context(Meta::new());
    let outcome = context.scope(|ctx| {
        ctx.resource_value("db")?;
        ctx.resource_value("cache")?;
        Ok(1)
    });
    assert_eq!(outcome.expect("body succeeds"), Some(1));
    assert!(context.exit_errors().is_empty());
    assert_eq!(context.state(), LifecycleState::Exited);
}

#[rstest]
fn resources_are_lazy_and_cached(journal: Journal) {
    let manager = scripted_manager(&journal, &[("db", Script::well_behaved())], &[]);
    let context = manager.context(Meta::new());
    context
        .scope(|ctx| {
            assert!(!ctx.contains("db"));
            let first = ctx.resource::<String>("db")?;
            let second = ctx.resource::<String>("db")?;
            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(first.as_str(), "db-value");
            assert!(ctx.contains("db"));
            Ok(())
        })
        .expect("body succeeds");
    assert_eq!(journal.count("enter:db"), 1);
    assert_eq!(journal.count("exit:db"), 1);
}

#[rstest]
fn unused_resources_are_never_opened(journal: Journal) {
    let manager = scripted_manager(&journal, &[("db", Script::well_behaved())], &[]);
    manager
        .context(Meta::new())
        .scope(|_| Ok(()))
        .expect("body succeeds");
    assert!(journal.entries().is_empty());
}

#[rstest]
fn resource_that_finishes_early_is_a_setup_error(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[("db", Script::acquiring(OnAcquire::Finish))],
        &[],
    );
    let reached = Cell::new(false);
    let fault = manager
        .context(Meta::new())
        .scope(|ctx| {
            ctx.resource_value("db")?;
            reached.set(true);
            Ok(())
        })
        .expect_err("setup error surfaces");
    assert_eq!(dal_error(&fault), &DalError::resource_setup("db"));
    assert!(!reached.get());
    assert_eq!(journal.count("exit:db"), 0);
}

#[rstest]
fn middleware_that_finishes_early_is_a_setup_error(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[],
        &[
            ("outer", Script::well_behaved()),
            ("lazy", Script::acquiring(OnAcquire::Finish)),
        ],
    );
    let reached = Cell::new(false);
    let fault = manager
        .context(Meta::new())
        .scope(|_| {
            reached.set(true);
            Ok(())
        })
        .expect_err("setup error surfaces");
    assert_eq!(dal_error(&fault), &DalError::middleware_setup("lazy"));
    assert!(!reached.get());
    // Only middleware that became ready is torn down.
    assert_eq!(journal.count("exit:lazy"), 0);
    assert_eq!(
        journal.entries().last().map(String::as_str),
        Some("exit:outer:context middleware 'lazy' finished without becoming ready")
    );
}

#[rstest]
fn failing_setup_still_tears_down_started_middleware(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[],
        &[
            ("outer", Script::well_behaved()),
            ("broken", Script::acquiring(OnAcquire::Fail)),
        ],
    );
    let context = manager.context(Meta::new());
    let fault = context.enter().expect_err("setup fails");
    assert_eq!(fault.to_string(), "broken failed to start");
    assert_eq!(context.state(), LifecycleState::Exited);
    assert_eq!(
        journal.joined(),
        "enter:outer,enter:broken,exit:outer:broken failed to start"
    );
}

#[rstest]
fn resource_ready_twice_is_captured_not_raised(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[("db", Script::releasing(OnRelease::ReadyAgain))],
        &[],
    );
    let context = manager.context(Meta::new());
    let outcome = context.scope(|ctx| ctx.resource_value("db").map(|_| "done"));
    assert_eq!(outcome.expect("body result is returned"), Some("done"));

    let errors = context.exit_errors();
    assert_eq!(errors.len(), 1);
    let error = errors.first().expect("one exit error");
    assert_eq!(error.source(), &ExitSource::Resource("db".to_owned()));
    assert!(matches!(
        error.fault().dal_error(),
        Some(DalError::ProtocolViolation { .. })
    ));
}

#[rstest]
fn middleware_ready_twice_is_raised(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[],
        &[("audit", Script::releasing(OnRelease::ReadyAgain))],
    );
    let fault = manager
        .context(Meta::new())
        .scope(|_| Ok(()))
        .expect_err("protocol violation surfaces");
    assert_eq!(
        dal_error(&fault),
        &DalError::protocol_violation("audit", "became ready more than once")
    );
}

#[rstest]
fn middleware_exits_in_reverse_order(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[],
        &[
            ("first", Script::well_behaved()),
            ("second", Script::well_behaved()),
            ("third", Script::well_behaved()),
        ],
    );
    manager
        .context(Meta::new())
        .scope(|_| Ok(()))
        .expect("body succeeds");
    assert_eq!(
        journal.joined(),
        "enter:first,enter:second,enter:third,exit:third,exit:second,exit:first"
    );
}

#[rstest]
fn every_resource_closes_exactly_once_despite_failures(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[
            ("db", Script::releasing(OnRelease::Fail)),
            ("cache", Script::well_behaved()),
            ("queue", Script::releasing(OnRelease::Fail)),
        ],
        &[],
    );
    let context = manager.context(Meta::new());
    context
        .scope(|ctx| {
            for name in ["db", "cache", "queue", "db"] {
                ctx.resource_value(name)?;
            }
            Ok(())
        })
        .expect("cleanup failures are not raised");

    for name in ["db", "cache", "queue"] {
        assert_eq!(journal.count(&format!("exit:{name}")), 1, "{name}");
    }
    let mut sources: Vec<String> = context
        .exit_errors()
        .iter()
        .map(|error| error.source().to_string())
        .collect();
    sources.sort();
    assert_eq!(sources, ["resource 'db'", "resource 'queue'"]);
}

#[rstest]
fn body_fault_survives_resource_cleanup_failures(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[("db", Script::releasing(OnRelease::Fail))],
        &[("audit", Script::well_behaved())],
    );
    let original = Fault::msg("request failed");
    let raised = original.clone();
    let context = manager.context(Meta::new());
    let fault = context
        .scope(|ctx| -> Result<(), Fault> {
            ctx.resource_value("db")?;
            Err(raised)
        })
        .expect_err("body fault surfaces");
    assert!(fault.is_same(&original));
    assert_eq!(context.exit_errors().len(), 1);
    assert_eq!(journal.count("exit:db:request failed"), 1);
}

#[rstest]
fn resource_acquire_failure_propagates_unchanged(journal: Journal) {
    let manager = scripted_manager(&journal, &[("db", Script::acquiring(OnAcquire::Fail))], &[]);
    let context = manager.context(Meta::new());
    let fault = context
        .scope(|ctx| ctx.resource_value("db").map(|_| ()))
        .expect_err("acquire failure surfaces");
    assert_eq!(fault.to_string(), "db failed to start");
    assert!(context.exit_errors().is_empty());
    assert_eq!(journal.count("exit:db:db failed to start"), 0);
}

#[rstest]
fn suppressing_middleware_swallows_the_body_fault(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[],
        &[
            ("guard", Script::releasing(OnRelease::Finish)),
            ("inner", Script::well_behaved()),
        ],
    );
    let outcome = manager
        .context(Meta::new())
        .scope(|_| -> Result<(), Fault> { Err(Fault::msg("boom")) });
    assert_eq!(outcome.expect("fault suppressed"), None);
    // The guard sees the fault; nothing outside it does.
    assert_eq!(
        journal.joined(),
        "enter:guard,enter:inner,exit:inner:boom,exit:guard:boom"
    );
}

#[rstest]
fn replacement_faults_flow_to_outer_middleware(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[],
        &[
            ("outer", Script::well_behaved()),
            ("translator", Script::releasing(OnRelease::Fail)),
        ],
    );
    let fault = manager
        .context(Meta::new())
        .scope(|_| -> Result<(), Fault> { Err(Fault::msg("boom")) })
        .expect_err("replacement surfaces");
    assert_eq!(fault.to_string(), "translator failed to close");
    assert_eq!(journal.count("exit:outer:translator failed to close"), 1);
}

#[rstest]
fn contexts_cannot_be_reused(journal: Journal) {
    let manager = scripted_manager(&journal, &[], &[]);
    let context = manager.context(Meta::new());
    context.enter().expect("first enter");
    let again = context.enter().expect_err("second enter");
    assert_eq!(dal_error(&again), &DalError::Reuse);
    context.exit(None).expect("exit");
    let after = context.enter().expect_err("enter after exit");
    assert_eq!(dal_error(&after), &DalError::Reuse);
}

#[rstest]
#[case::before_enter(false)]
#[case::after_exit(true)]
fn resources_need_an_open_context(journal: Journal, #[case] run_first: bool) {
    let manager = scripted_manager(&journal, &[("db", Script::well_behaved())], &[]);
    let context = manager.context(Meta::new());
    if run_first {
        context.scope(|_| Ok(())).expect("body succeeds");
    }
    let fault = context.resource_value("db").expect_err("closed context");
    assert!(matches!(dal_error(&fault), DalError::InvalidState { .. }));
}

#[rstest]
fn exit_requires_an_entered_context(journal: Journal) {
    let manager = scripted_manager(&journal, &[], &[]);
    let fault = manager
        .context(Meta::new())
        .exit(None)
        .expect_err("never entered");
    assert_eq!(
        dal_error(&fault),
        &DalError::invalid_state("context exit", LifecycleState::Created)
    );
}

#[rstest]
fn unknown_and_mistyped_resources_are_rejected(journal: Journal) {
    let manager = scripted_manager(&journal, &[("db", Script::well_behaved())], &[]);
    manager
        .context(Meta::new())
        .scope(|ctx| {
            let unknown = ctx.resource_value("nope").expect_err("unknown");
            assert_eq!(dal_error(&unknown), &DalError::unknown_resource("nope"));
            let mistyped = ctx.resource::<u64>("db").expect_err("wrong type");
            assert!(matches!(
                dal_error(&mistyped),
                DalError::ResourceType { name, .. } if name == "db"
            ));
            Ok(())
        })
        .expect("body succeeds");
}

#[test]
fn middleware_can_read_resources_while_tearing_down() {
    let seen = Arc::new(std::sync::Mutex::new(None));
    let sink = Arc::clone(&seen);
    let manager = DataManager::builder()
        .register_resource("tenant", ValueResource::new("acme".to_owned()))
        .expect("register tenant")
        .register_context_middleware(FnMiddleware::new(
            "tenant-log",
            |ctx| ctx.resource_value("tenant").map(|_| ()),
            move |ctx, _| {
                let tenant = ctx.resource::<String>("tenant")?;
                *sink.lock().expect("sink lock") = Some(tenant.as_str().to_owned());
                Ok(Disposition::Propagate)
            },
        ))
        .build();
    manager
        .context(Meta::new())
        .scope(|_| Ok(()))
        .expect("body succeeds");
    assert_eq!(
        seen.lock().expect("sink lock").as_deref(),
        Some("acme")
    );
}

#[test]
fn fn_resources_release_what_they_acquire() {
    let closed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&closed);
    let manager = DataManager::builder()
        .register_resource(
            "numbers",
            FnResource::new(
                |_| Ok(vec![1_u8, 2, 3]),
                move |values: &Vec<u8>, _| {
                    counter.fetch_add(values.len(), std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                },
            ),
        )
        .expect("register numbers")
        .build();
    let total = manager
        .context(Meta::new())
        .scope(|ctx| Ok(ctx.resource::<Vec<u8>>("numbers")?.len()))
        .expect("body succeeds");
    assert_eq!(total, Some(3));
    assert_eq!(closed.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[rstest]
fn contexts_leave_the_active_stack(journal: Journal) {
    let manager = scripted_manager(&journal, &[], &[]);
    let depth = active_depth();
    let outer = manager.context(Meta::new());
    outer
        .scope(|ctx| {
            assert!(manager.active_context().is_some_and(|active| active.is_same(ctx)));
            let inner = manager.context(Meta::new());
            inner.scope(|nested| {
                assert!(manager.active_context().is_some_and(|active| active.is_same(nested)));
                assert_eq!(active_depth(), depth + 2);
                Ok(())
            })?;
            assert!(manager.active_context().is_some_and(|active| active.is_same(ctx)));
            Ok(())
        })
        .expect("body succeeds");
    assert!(manager.active_context().is_none());
    assert_eq!(active_depth(), depth);
}

#[rstest]
fn panicking_bodies_still_tear_down(journal: Journal) {
    let manager = scripted_manager(
        &journal,
        &[("db", Script::well_behaved())],
        &[("audit", Script::well_behaved())],
    );
    let depth = active_depth();
    let context = manager.context(Meta::new());
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
        context.scope(|ctx| -> Result<(), Fault> {
            ctx.resource_value("db")?;
            panic!("body exploded");
        })
    }));
    assert!(unwound.is_err());
    assert_eq!(journal.count("exit:audit:context body panicked"), 1);
    assert_eq!(journal.count("exit:db:context body panicked"), 1);
    assert_eq!(context.state(), LifecycleState::Exited);
    assert!(manager.active_context().is_none());
    assert_eq!(active_depth(), depth);
}

#[rstest]
fn panicking_setup_leaves_no_dead_context_behind(journal: Journal) {
    let manager = scripted_builder(&journal, &[], &[("audit", Script::well_behaved())])
        .register_context_middleware(FnMiddleware::new(
            "fragile",
            |_: &ExecutionContext| -> Result<(), Fault> { panic!("setup exploded") },
            |_, _| Ok(Disposition::Propagate),
        ))
        .build();
    let depth = active_depth();
    let reached = Cell::new(false);
    let context = manager.context(Meta::new());
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
        context.scope(|_| {
            reached.set(true);
            Ok(())
        })
    }));
    assert!(unwound.is_err());
    assert!(!reached.get());
    assert_eq!(journal.joined(), "enter:audit,exit:audit:context setup panicked");
    assert_eq!(context.state(), LifecycleState::Exited);
    assert!(manager.active_context().is_none());
    assert_eq!(active_depth(), depth);
}

#[rstest]
fn managers_do_not_see_each_others_contexts(journal: Journal) {
    let first = scripted_manager(&journal, &[], &[]);
    let second = scripted_manager(&journal, &[], &[]);
    first
        .context(Meta::new())
        .scope(|_| {
            assert!(first.active_context().is_some());
            assert!(second.active_context().is_none());
            Ok(())
        })
        .expect("body succeeds");
}

#[test]
fn meta_is_exposed_to_the_body() {
    let manager = DataManager::builder().build();
    let meta: Meta = [("user", json!("ada")), ("tenant", json!(""))]
        .into_iter()
        .collect();
    manager
        .context(meta)
        .scope(|ctx| {
            assert_eq!(ctx.meta().require("user").ok(), Some(&json!("ada")));
            assert_eq!(
                ctx.meta().require("tenant").expect_err("blank"),
                DalError::meta_required("tenant")
            );
            assert!(ctx.meta().get("missing").is_none());
            Ok(())
        })
        .expect("body succeeds");
}

// -----------------------------------------------------------------------------
// Hooks
// -----------------------------------------------------------------------------

mock! {
    Hooks {}
    impl ContextHooks for Hooks {
        fn setup(&self, context: &ExecutionContext) -> Result<(), Fault>;
    }
}

#[test]
fn setup_hook_failure_aborts_the_context() {
    let mut hooks = MockHooks::new();
    hooks
        .expect_setup()
        .times(1)
        .returning(|_| Err(Fault::msg("tenant missing")));
    let manager = DataManager::builder().hooks(hooks).build();
    let reached = Cell::new(false);
    let context = manager.context(Meta::new());
    let fault = context
        .scope(|_| {
            reached.set(true);
            Ok(())
        })
        .expect_err("setup hook fails");
    assert_eq!(fault.to_string(), "tenant missing");
    assert!(!reached.get());
    assert_eq!(context.state(), LifecycleState::Exited);
    assert!(manager.active_context().is_none());
}

struct FailingTeardown;

impl ContextHooks for FailingTeardown {
    fn teardown(&self, _context: &ExecutionContext, _fault: Option<&Fault>) -> Result<(), Fault> {
        Err(Fault::msg("flush failed"))
    }
}

#[test]
fn teardown_hook_failures_are_captured() {
    let manager = DataManager::builder().hooks(FailingTeardown).build();
    let context = manager.context(Meta::new());
    context.scope(|_| Ok(())).expect("not raised");
    let errors = context.exit_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.first().map(|error| error.source().clone()),
        Some(ExitSource::TeardownHook)
    );
}

// -----------------------------------------------------------------------------
// Resource registration
// -----------------------------------------------------------------------------

mock! {
    Store {}
    impl Resource for Store {
        fn provider(&self, context: &ExecutionContext) -> ResourceProvider;
        fn setup(&self, manager: &Weak<DataManager>);
    }
}

#[test]
fn resources_are_set_up_once_at_build_and_never_opened_unused() {
    let mut store = MockStore::new();
    store.expect_setup().times(1).return_const(());
    store.expect_provider().never();
    let manager = DataManager::builder()
        .register_resource("store", store)
        .expect("register store")
        .build();
    manager
        .context(Meta::new())
        .scope(|_| Ok(()))
        .expect("body succeeds");
}

#[test]
fn duplicate_resources_are_rejected_and_replace_wins() {
    let duplicate = DataManager::builder()
        .register_resource("db", ValueResource::new(1_u32))
        .expect("first registration")
        .register_resource("db", ValueResource::new(2_u32))
        .expect_err("duplicate registration");
    assert!(matches!(duplicate, DalError::AlreadyExists { .. }));

    let manager = DataManager::builder()
        .register_resource("db", ValueResource::new(1_u32))
        .expect("first registration")
        .replace_resource("db", ValueResource::new(2_u32))
        .build();
    let value = manager
        .context(Meta::new())
        .scope(|ctx| Ok(*ctx.resource::<u32>("db")?))
        .expect("body succeeds");
    assert_eq!(value, Some(2));
}

// -----------------------------------------------------------------------------
// Dispatch
// -----------------------------------------------------------------------------

#[fixture]
fn users_manager() -> Arc<DataManager> {
    DataManager::builder()
        .register_service("users", users_service())
        .expect("register users")
        .build()
}

#[rstest]
fn nested_methods_receive_arguments_unchanged(users_manager: Arc<DataManager>) {
    let result = users_manager
        .run(Meta::new(), |dal, _| {
            dal.attr("users")?
                .attr("profile")
                .attr("update")
                .call(vec![json!(1), json!({"x": 1})])
        })
        .expect("call succeeds");
    assert_eq!(result, Some(json!({"id": 1, "changes": {"x": 1}})));
}

#[rstest]
fn missing_methods_report_the_failing_path(users_manager: Arc<DataManager>) {
    let fault = users_manager
        .run(Meta::new(), |dal, _| dal.command("dal.users.nope.update").call(Args::new()))
        .expect_err("unknown method");
    let path = dal_error(&fault).path().expect("path attached");
    assert_eq!(dotted(path), "users.nope");
}

#[rstest]
fn top_level_access_needs_an_active_context(users_manager: Arc<DataManager>) {
    let error = users_manager.dal().attr("users").expect_err("no context");
    assert_eq!(error, DalError::NoActiveContext);

    let deferred = users_manager.dal().command("users.count");
    let fault = deferred.call(Args::new()).expect_err("no context");
    assert_eq!(dal_error(&fault), &DalError::NoActiveContext);
}

#[rstest]
fn commands_are_fresh_and_compare_by_path(users_manager: Arc<DataManager>) {
    let dal = users_manager.dal();
    let base = dal.command("users");
    let first = base.attr("count");
    let second = base.attr("count");
    assert!(first.same_path(&second));
    assert!(!first.same_path(&base));
    assert_eq!(base.path().len(), 1);
    assert_eq!(first.to_string(), "users.count");
}

#[rstest]
fn explicit_contexts_can_be_passed_to_calls(users_manager: Arc<DataManager>) {
    let context = users_manager.context(Meta::new());
    let command = users_manager.dal().command("users.count");
    let closed = command.call_in(&context, Args::new()).expect_err("not entered");
    assert!(matches!(dal_error(&closed), DalError::InvalidState { .. }));

    let result = context
        .scope(|ctx| command.call_in(ctx, Args::new()))
        .expect("call succeeds");
    assert_eq!(result, Some(json!(2)));
}

fn answering_manager(answer: &'static str) -> Arc<DataManager> {
    DataManager::builder()
        .register_service(
            "users",
            Service::new().with_method("who", move |_: &MethodCall<'_>| Ok(json!(answer))),
        )
        .expect("register users")
        .build()
}

#[test]
fn commands_reject_contexts_of_other_managers() {
    let first = answering_manager("first");
    let second = answering_manager("second");
    let command = first.dal().command("users.who");
    let fault = second
        .context(Meta::new())
        .scope(|ctx| command.call_in(ctx, Args::new()))
        .expect_err("foreign context");
    assert_eq!(dal_error(&fault), &DalError::ForeignContext);

    let own = first
        .context(Meta::new())
        .scope(|ctx| command.call_in(ctx, Args::new()))
        .expect("own context");
    assert_eq!(own, Some(json!("first")));
}

#[test]
fn method_middleware_composes_as_an_onion() {
    let journal = Journal::default();
    let layer = |label: &'static str, journal: &Journal| {
        let journal = journal.clone();
        from_fn(move |request: &mut Request, next| {
            journal.record(format!("{label}-enter"));
            let result = next(request);
            journal.record(format!("{label}-exit"));
            result
        })
    };
    let handler_journal = journal.clone();
    let manager = DataManager::builder()
        .register_service("users", users_service())
        .expect("register users")
        .method_middleware(layer("M1", &journal))
        .method_middleware(layer("M2", &journal))
        .default_method_middleware(Vec::new())
        .terminal_handler(Arc::new(move |_request: &mut Request| -> Result<Value, Fault> {
            handler_journal.record("H");
            Ok(Value::Null)
        }))
        .build();
    manager
        .run(Meta::new(), |dal, _| dal.command("users.count").call(Args::new()))
        .expect("call succeeds");
    assert_eq!(journal.joined(), "M1-enter,M2-enter,H,M2-exit,M1-exit");
    assert_eq!(manager.chain().layers(), 2);
}

#[test]
fn middleware_may_rewrite_arguments() {
    let manager = DataManager::builder()
        .register_service("users", users_service())
        .expect("register users")
        .method_middleware(from_fn(|request: &mut Request, next| {
            request.args_mut().positional_mut().insert(0, json!(42));
            next(request)
        }))
        .build();
    let result = manager
        .run(Meta::new(), |dal, _| {
            dal.command("users.profile.update").call(vec![json!({"x": 1})])
        })
        .expect("call succeeds");
    assert_eq!(result, Some(json!({"id": 42, "changes": {"x": 1}})));
}

#[test]
fn without_a_resolver_the_terminal_handler_rejects_the_path() {
    let manager = DataManager::builder()
        .register_service("users", users_service())
        .expect("register users")
        .default_method_middleware(Vec::new())
        .build();
    let fault = manager
        .run(Meta::new(), |dal, _| dal.command("users.count").call(Args::new()))
        .expect_err("nothing resolved the target");
    assert_eq!(
        dal_error(&fault).path().map(dotted).as_deref(),
        Some("users.count")
    );
}

#[test]
fn services_reach_their_manager_and_context() {
    let manager = DataManager::builder()
        .register_service(
            "users",
            users_service().with_service("audit", Service::new()),
        )
        .expect("register users")
        .build();
    let audit = manager
        .services()
        .get("users")
        .and_then(|users| users.child("audit"))
        .expect("nested service");
    assert!(audit.is_setup());
    assert_eq!(audit.context().expect_err("inactive"), DalError::NoActiveContext);
    manager
        .context(Meta::new())
        .scope(|ctx| {
            assert!(audit.context()?.is_same(ctx));
            Ok(())
        })
        .expect("body succeeds");
}

#[rstest]
fn run_hands_the_body_a_dal_for_the_same_manager(journal: Journal) {
    let manager = scripted_builder(&journal, &[("db", Script::well_behaved())], &[])
        .register_service("users", users_service())
        .expect("register users")
        .build();
    let result = manager
        .run(Meta::new(), |dal, ctx| {
            ctx.resource_value("db")?;
            dal.attr("users")?.attr("count").call(Args::new())
        })
        .expect("body succeeds");
    assert_eq!(result, Some(json!(2)));
    assert_eq!(journal.joined(), "enter:db,exit:db");
}
