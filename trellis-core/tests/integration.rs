//! Integration Tests
//!
//! These tests drive observation, watchers, the scheduler, the patch engine
//! and components together through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use trellis_core::backend::{MemoryBackend, Op};
use trellis_core::component::{factory, Component, ComponentDef};
use trellis_core::reactive::{
    observe, watch, Callback, Getter, Signal, Value, WatchOptions, WatchSource, Watcher,
    WatcherOptions,
};
use trellis_core::scheduler::{flush_ticks, next_tick};
use trellis_core::vdom::{
    create_element, AsyncComponent, AsyncResolver, NodeOps, Normalization, OldTree, Patcher, VNode,
    VNodeData,
};

fn counting_callback() -> (Arc<AtomicI32>, Callback) {
    let calls = Arc::new(AtomicI32::new(0));
    let c = calls.clone();
    let callback: Callback = Arc::new(move |_, _| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (calls, callback)
}

fn keyed_list(keys: &[i64]) -> VNode {
    VNode::element("ul").children(
        keys.iter()
            .map(|k| VNode::element("li").key(*k).child(VNode::text(k.to_string()))),
    )
}

/// Mount `first` into a container, clear the op log, then patch to `second`.
fn patch_pair(first: VNode, second: VNode) -> (Arc<Mutex<MemoryBackend>>, Vec<Op>, VNode) {
    let (memory, backend) = MemoryBackend::shared();
    let patcher = Patcher::new(backend);
    let container = memory.lock().create_element("div");
    let target = memory.lock().create_element("div");
    memory.lock().insert_before(container, target, None);

    let mut first = first;
    patcher.patch(Some(OldTree::Realized(target)), Some(&mut first), false, false);
    memory.lock().take_ops();

    let mut second = second;
    patcher.patch(Some(OldTree::VNode(first)), Some(&mut second), false, false);
    let ops = memory.lock().take_ops();
    (memory, ops, second)
}

/// A watcher is only notified by the fields it read.
#[test]
fn watchers_are_notified_precisely() {
    let data = Value::object([("a", Value::from(1)), ("b", Value::from(2))]);
    observe(&data);
    let object = data.as_object().unwrap().clone();

    let (calls, callback) = counting_callback();
    let reader = object.clone();
    let getter: Getter = Arc::new(move || Ok(reader.get("a")));
    let _watcher = Watcher::new(
        getter,
        Some(callback),
        WatcherOptions {
            sync: true,
            ..Default::default()
        },
    )
    .unwrap();

    object.assign("b", Value::from(20));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    object.assign("a", Value::from(10));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// A computed watcher nobody depends on is only marked dirty by changes.
#[test]
fn lazy_computed_without_dependents_does_not_rerun() {
    let data = Value::object([("n", Value::from(1))]);
    observe(&data);
    let object = data.as_object().unwrap().clone();

    let evaluations = Arc::new(AtomicI32::new(0));
    let evals = evaluations.clone();
    let reader = object.clone();
    let getter: Getter = Arc::new(move || {
        evals.fetch_add(1, Ordering::SeqCst);
        Ok(Value::from(reader.get("n").as_f64().unwrap_or(0.0) + 1.0))
    });
    let computed = Watcher::new(
        getter,
        None,
        WatcherOptions {
            lazy: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 0);

    assert_eq!(computed.evaluate().unwrap(), Value::from(2));
    object.assign("n", Value::from(5));
    object.assign("n", Value::from(6));
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    assert!(computed.is_dirty());

    assert_eq!(computed.evaluate().unwrap(), Value::from(7));
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);
}

/// A deep watch fires for writes three levels below the watched value.
#[test]
fn deep_watch_sees_nested_writes() {
    let data = Value::from_json(serde_json::json!({ "a": { "b": { "c": { "d": 1 } } } }));
    observe(&data);

    let (calls, callback) = counting_callback();
    let _handle = watch(
        WatchSource::path(&data, "a"),
        callback,
        WatchOptions {
            deep: true,
            sync: true,
            ..Default::default()
        },
    )
    .unwrap();

    let c = data
        .as_object()
        .and_then(|o| o.get_untracked("a"))
        .and_then(|a| a.as_object().and_then(|a| a.get_untracked("b")))
        .and_then(|b| b.as_object().and_then(|b| b.get_untracked("c")))
        .unwrap();
    c.as_object().unwrap().assign("d", Value::from(2));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// A shallow watch on `user.name` ignores writes elsewhere under `user`.
#[test]
fn shallow_watch_ignores_sibling_subtrees() {
    let data = Value::from_json(serde_json::json!({
        "user": { "name": "ada", "address": { "city": "london" } }
    }));
    observe(&data);

    let (calls, callback) = counting_callback();
    let _handle = watch(
        WatchSource::path(&data, "user.name"),
        callback,
        WatchOptions {
            sync: true,
            ..Default::default()
        },
    )
    .unwrap();

    let user = data.as_object().and_then(|o| o.get_untracked("user")).unwrap();
    let address = user.as_object().and_then(|u| u.get_untracked("address")).unwrap();
    address.as_object().unwrap().assign("city", Value::from("paris"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    user.as_object().unwrap().assign("name", Value::from("grace"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Patching a tree against an identical one issues no backend operations.
#[test]
fn identical_patch_is_free() {
    let tree = || {
        VNode::element("section")
            .attr("id", "main")
            .class("card")
            .style("color", "red")
            .child(keyed_list(&[1, 2, 3]))
            .child(VNode::text("footer"))
    };
    let (_memory, ops, _) = patch_pair(tree(), tree());
    assert!(ops.is_empty(), "{ops:?}");
}

/// Reversing a keyed list only moves nodes.
#[test]
fn reversing_a_keyed_list_only_moves() {
    let keys: Vec<i64> = (0..100).collect();
    let reversed: Vec<i64> = keys.iter().rev().copied().collect();
    let (memory, ops, second) = patch_pair(keyed_list(&keys), keyed_list(&reversed));

    assert!(ops.iter().all(|op| matches!(op, Op::Move { .. })), "{ops:?}");
    assert!(ops.len() <= keys.len());

    let root = second.elm.unwrap();
    let memory = memory.lock();
    let texts: Vec<String> = memory
        .children(root)
        .into_iter()
        .map(|li| memory.serialize(li))
        .collect();
    let expected: Vec<String> = reversed.iter().map(|k| format!("<li>{k}</li>")).collect();
    assert_eq!(texts, expected);
}

/// Moving the last keyed child to the front is a single move.
#[test]
fn rotating_a_keyed_list_is_one_move() {
    let (memory, ops, second) = patch_pair(keyed_list(&[1, 2, 3]), keyed_list(&[3, 1, 2]));
    assert_eq!(ops.len(), 1, "{ops:?}");
    assert!(matches!(ops[0], Op::Move { .. }));
    assert_eq!(
        memory.lock().serialize(second.elm.unwrap()),
        "<ul><li>3</li><li>1</li><li>2</li></ul>"
    );
}

fn counter_def(renders: Arc<AtomicI32>) -> Arc<ComponentDef> {
    ComponentDef::new("counter")
        .data(|| Value::object([("count", Value::from(0))]))
        .render(move |ctx| {
            renders.fetch_add(1, Ordering::SeqCst);
            Ok(VNode::element("p").child(VNode::text(format!("count: {}", ctx.get("count")))))
        })
        .build()
}

/// Writes within one tick produce a single re-render with the final state.
#[test]
fn writes_in_one_tick_render_once() {
    let renders = Arc::new(AtomicI32::new(0));
    let (memory, backend) = MemoryBackend::shared();
    let app = Component::mount(counter_def(renders.clone()), backend, None, IndexMap::new()).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    app.set("count", Value::from(1));
    app.set("count", Value::from(2));
    app.set("count", Value::from(3));
    flush_ticks();

    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(
        memory.lock().serialize(app.root_elm().unwrap()),
        "<p>count: 3</p>"
    );
}

/// Writes to several fields the render reads still batch into one render.
#[test]
fn writes_to_several_fields_render_once() {
    let renders = Arc::new(AtomicI32::new(0));
    let counter = renders.clone();
    let def = ComponentDef::new("card")
        .data(|| {
            Value::object([
                ("title", Value::from("")),
                ("body", Value::from("")),
                ("footer", Value::from("")),
            ])
        })
        .render(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(VNode::element("section").children([
                VNode::element("h1").child(VNode::text(ctx.get("title").to_display_string())),
                VNode::element("p").child(VNode::text(ctx.get("body").to_display_string())),
                VNode::element("small").child(VNode::text(ctx.get("footer").to_display_string())),
            ]))
        })
        .build();

    let (memory, backend) = MemoryBackend::shared();
    let app = Component::mount(def, backend, None, IndexMap::new()).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    app.set("title", Value::from("T"));
    app.set("body", Value::from("B"));
    app.set("footer", Value::from("F"));
    flush_ticks();

    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(
        memory.lock().serialize(app.root_elm().unwrap()),
        "<section><h1>T</h1><p>B</p><small>F</small></section>"
    );
}

/// Data bags can be written as struct literals outside the crate.
#[test]
fn data_bags_are_plain_structs() {
    let data = VNodeData {
        attrs: [("id".to_string(), Value::from("app"))].into_iter().collect(),
        style: [("color".to_string(), "red".to_string())].into_iter().collect(),
        ..Default::default()
    };
    let mut tree = create_element(&(), "div", data, Vec::new(), Normalization::None);

    let (memory, backend) = MemoryBackend::shared();
    let root = Patcher::new(backend).patch(None, Some(&mut tree), false, false).unwrap();
    assert_eq!(
        memory.lock().serialize(root),
        r#"<div id="app" style="color: red;"></div>"#
    );
}

/// The counter scenario: mount, increment, flush.
#[test]
fn counter_renders_the_new_count() {
    let (memory, backend) = MemoryBackend::shared();
    let container = memory.lock().create_element("body");
    let target = memory.lock().create_element("div");
    memory.lock().insert_before(container, target, None);

    let renders = Arc::new(AtomicI32::new(0));
    let app = Component::mount(counter_def(renders), backend, Some(target), IndexMap::new()).unwrap();
    assert_eq!(memory.lock().serialize(container), "<body><p>count: 0</p></body>");

    let count = app.get("count").as_f64().unwrap_or(0.0);
    app.set("count", Value::from(count + 1.0));
    flush_ticks();

    assert_eq!(memory.lock().serialize(container), "<body><p>count: 1</p></body>");
}

/// A click handler mutating state re-renders on the next tick.
#[test]
fn events_drive_updates() {
    let def = ComponentDef::new("clicker")
        .data(|| Value::object([("clicks", Value::from(0))]))
        .render(|ctx| {
            let component = ctx.component().clone();
            Ok(VNode::element("button")
                .on("click", move |_| {
                    let clicks = component.get("clicks").as_f64().unwrap_or(0.0);
                    component.set("clicks", Value::from(clicks + 1.0));
                })
                .child(VNode::text(ctx.get("clicks").to_display_string())))
        })
        .build();

    let (memory, backend) = MemoryBackend::shared();
    let app = Component::mount(def, backend, None, IndexMap::new()).unwrap();
    let button = app.root_elm().unwrap();

    assert!(MemoryBackend::dispatch(&memory, button, "click", &Value::Null));
    assert!(MemoryBackend::dispatch(&memory, button, "click", &Value::Null));
    flush_ticks();

    assert_eq!(memory.lock().serialize(button), "<button>2</button>");
}

/// Awaiting `next_tick` observes the flushed state.
#[tokio::test]
async fn next_tick_resolves_after_the_flush() {
    let (memory, backend) = MemoryBackend::shared();
    let renders = Arc::new(AtomicI32::new(0));
    let app = Component::mount(counter_def(renders.clone()), backend, None, IndexMap::new()).unwrap();

    app.set("count", Value::from(7));
    next_tick(|| {}).await;

    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(
        memory.lock().serialize(app.root_elm().unwrap()),
        "<p>count: 7</p>"
    );
}

/// Typed signals participate in the same dependency tracking.
#[test]
fn signals_drive_watchers() {
    let signal = Signal::new(1);
    let (calls, callback) = counting_callback();
    let reader = signal.clone();
    let getter: Getter = Arc::new(move || Ok(Value::from(reader.get())));
    let _watcher = Watcher::new(
        getter,
        Some(callback),
        WatcherOptions {
            sync: true,
            ..Default::default()
        },
    )
    .unwrap();

    signal.set(1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    signal.set(2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(signal.subscriber_count(), 1);
}

/// A failed async load swaps the loading component for the error component.
#[test]
fn async_component_falls_back_to_the_error_component() {
    trellis_core::config::update(|c| c.silent = true);
    let resolver: Arc<Mutex<Option<AsyncResolver>>> = Arc::new(Mutex::new(None));
    let keep = resolver.clone();
    let spinner = ComponentDef::new("spinner")
        .render(|_| Ok(VNode::element("i").child(VNode::text("loading"))))
        .build();
    let failure = ComponentDef::new("failure")
        .render(|_| Ok(VNode::element("b").child(VNode::text("failed"))))
        .build();
    let profile = AsyncComponent::new("profile", move |r| {
        *keep.lock() = Some(r);
    })
    .loading(factory(&spinner))
    .error(factory(&failure));

    let page = ComponentDef::new("page")
        .async_component("profile", profile)
        .render(|ctx| Ok(ctx.h("section", (), vec![ctx.h("profile", (), Vec::new()).into()])))
        .build();

    let (memory, backend) = MemoryBackend::shared();
    let app = Component::mount(page, backend, None, IndexMap::new()).unwrap();
    let root = app.root_elm().unwrap();
    assert_eq!(memory.lock().serialize(root), "<section><i>loading</i></section>");

    let r = resolver.lock().take().unwrap();
    r.reject("timed out");
    flush_ticks();

    assert_eq!(memory.lock().serialize(root), "<section><b>failed</b></section>");
    trellis_core::config::install(trellis_core::config::Config::default());
}
