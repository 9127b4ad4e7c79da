use ctxcall::context::Context;
use ctxcall::future::FutureExt;
use ctxcall::injectable::{Marker, ParamSpec};
use ctxcall::value::Args;
use ctxcall::{inject, Callable, InjectOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn seed_context() -> Context {
    let mut context = Context::new();
    context.insert_named("seed", 1_i64);
    context
}

fn sync_level(name: &str, inner: Option<Callable>) -> Callable {
    let builder = Callable::builder(name);
    let builder = match inner {
        Some(inner) => builder.param(ParamSpec::new("inner").of::<i64>().with(Marker::depends(inner))),
        None => builder.param(ParamSpec::new("seed").of::<i64>()),
    };
    builder.returns::<i64>().sync_body(|args: Args| {
        let input = args
            .value("inner")
            .or_else(|| args.value("seed"))
            .and_then(|value| value.cloned::<i64>())
            .unwrap_or_default();
        Ok(input * 2)
    })
}

fn async_level(name: &str, inner: Option<Callable>) -> Callable {
    let builder = Callable::builder(name);
    let builder = match inner {
        Some(inner) => builder.param(ParamSpec::new("inner").of::<i64>().with(Marker::depends(inner))),
        None => builder.param(ParamSpec::new("seed").of::<i64>()),
    };
    builder.returns::<i64>().async_body(|args: Args| async move {
        let input = args
            .value("inner")
            .or_else(|| args.value("seed"))
            .and_then(|value| value.cloned::<i64>())
            .unwrap_or_default();
        Ok(input * 2)
    })
}

async fn run_chain(chain: Callable) -> i64 {
    let target = Callable::builder("target")
        .param(ParamSpec::new("result").of::<i64>().with(Marker::depends(chain)))
        .sync_body(|args: Args| args.require_cloned::<i64>("result"));

    inject(&target, &seed_context(), None, InjectOptions::default())
        .await
        .unwrap()
        .call()
        .await
        .unwrap()
        .cloned::<i64>()
        .unwrap()
}

#[tokio::test]
async fn should_resolve_deep_chains_regardless_of_body_flavor() {
    let all_sync = sync_level(
        "a",
        Some(sync_level("b", Some(sync_level("c", Some(sync_level("d", None)))))),
    );
    let all_async = async_level(
        "a",
        Some(async_level("b", Some(async_level("c", Some(async_level("d", None)))))),
    );
    let mixed = sync_level(
        "a",
        Some(async_level("b", Some(sync_level("c", Some(async_level("d", None)))))),
    );

    // seed 1 doubled through four levels
    assert_eq!(run_chain(all_sync).await, 16);
    assert_eq!(run_chain(all_async).await, 16);
    assert_eq!(run_chain(mixed).await, 16);
}

#[tokio::test]
async fn should_release_scoped_dependencies_in_reverse_order() {
    let order = Arc::new(Mutex::new(Vec::new()));

    // outer depends on inner, so acquisition order is inner then outer
    let inner_order = order.clone();
    let inner = Callable::builder("inner_scoped")
        .returns::<String>()
        .scoped_sync_body(move |_| {
            let inner_order = inner_order.clone();
            Ok((
                "sync".to_string(),
                Box::new(move || inner_order.lock().unwrap().push("inner"))
                    as Box<dyn FnOnce() + Send>,
            ))
        });

    let outer_order = order.clone();
    let outer = Callable::builder("outer_scoped")
        .param(ParamSpec::new("inner").of::<String>().with(Marker::depends(inner)))
        .returns::<String>()
        .scoped_async_body(move |args: Args| {
            let outer_order = outer_order.clone();
            async move {
                let combined = format!("{}+async", args.require::<String>("inner")?);
                let release = async move {
                    outer_order.lock().unwrap().push("outer");
                }
                .boxed();
                Ok((combined, release))
            }
        });

    let target = Callable::builder("target")
        .param(ParamSpec::new("value").of::<String>().with(Marker::depends(outer)))
        .sync_body(|args: Args| args.require_cloned::<String>("value"));

    let result = inject(&target, &Context::new(), None, InjectOptions::default())
        .await
        .unwrap()
        .call()
        .await
        .unwrap();

    assert_eq!(result.cloned::<String>().unwrap(), "sync+async");
    assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
}

#[tokio::test]
async fn should_release_scoped_resources_exactly_once_per_resolution() {
    let count = Arc::new(AtomicUsize::new(0));

    let release_count = count.clone();
    let scoped = Callable::builder("scoped").scoped_sync_body(move |_| {
        let release_count = release_count.clone();
        Ok((
            7_i64,
            Box::new(move || {
                release_count.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>,
        ))
    });

    let target = Callable::builder("target")
        .param(ParamSpec::new("x").of::<i64>().with(Marker::depends(scoped)))
        .sync_body(|args: Args| args.require_cloned::<i64>("x"));

    for _ in 0..2 {
        let result = inject(&target, &Context::new(), None, InjectOptions::default())
            .await
            .unwrap()
            .call()
            .await
            .unwrap();
        assert_eq!(result.cloned::<i64>().unwrap(), 7);
    }
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn should_pass_context_values_into_sub_dependencies() {
    let dep = Callable::builder("dep")
        .param(ParamSpec::new("uid").of::<i64>())
        .returns::<String>()
        .async_body(|args: Args| async move {
            Ok(format!("user-{}", args.require::<i64>("uid")?))
        });

    let target = Callable::builder("target")
        .param(ParamSpec::new("who").of::<String>().with(Marker::depends(dep)))
        .sync_body(|args: Args| args.require_cloned::<String>("who"));

    let mut context = Context::new();
    context.insert_named("uid", 99_i64);

    let result = inject(&target, &context, None, InjectOptions::default())
        .await
        .unwrap()
        .call()
        .await
        .unwrap();
    assert_eq!(result.cloned::<String>().unwrap(), "user-99");
}
