use ctxcall::context::{Context, FieldAccess, FieldResult};
use ctxcall::error::InjectError;
use ctxcall::injectable::{Marker, ParamSpec};
use ctxcall::value::{Args, Value};
use ctxcall::{inject, Callable, InjectOptions};

#[derive(Clone)]
struct User(String);

struct Settings {
    debug: bool,
    timeout: i64,
}

impl FieldAccess for Settings {
    fn field(&self, name: &str) -> FieldResult {
        match name {
            "debug" => FieldResult::Value(Value::new(self.debug)),
            "timeout" => FieldResult::Value(Value::new(self.timeout)),
            _ => FieldResult::Missing,
        }
    }
}

fn handler_context() -> Context {
    let mut context = Context::new();
    context.insert_named("id", 42_i64);
    context.insert_named("uid", 99_i64);
    context.insert_named("debug", false);
    context.insert_typed(User("Alice".to_string()));
    context.insert_model(Settings {
        debug: true,
        timeout: 30,
    });
    context
}

fn mid_dep() -> Callable {
    Callable::builder("mid_dep")
        .param(ParamSpec::new("user").of::<User>())
        .param(ParamSpec::new("uid").of::<i64>())
        .param(
            ParamSpec::new("timeout")
                .of::<i64>()
                .with(Marker::model_field::<Settings>()),
        )
        .param(
            ParamSpec::new("verbose")
                .of::<bool>()
                .with(Marker::model_field_named::<Settings, _>("debug")),
        )
        .returns::<String>()
        .async_body(|args: Args| async move {
            let user = args.require_cloned::<User>("user")?;
            let uid = args.require_cloned::<i64>("uid")?;
            let timeout = args.require_cloned::<i64>("timeout")?;
            let verbose = args.require_cloned::<bool>("verbose")?;
            Ok(format!(
                "{}-{}-{}-{}",
                user.0,
                uid,
                timeout,
                if verbose { "True" } else { "False" }
            ))
        })
}

fn handler() -> Callable {
    Callable::builder("handler")
        .param(ParamSpec::new("user").of::<User>())
        .param(ParamSpec::new("id").of::<i64>())
        .param(
            ParamSpec::new("timeout")
                .of::<i64>()
                .with(Marker::model_field::<Settings>()),
        )
        .param(
            ParamSpec::new("dep")
                .of::<String>()
                .with(Marker::depends(mid_dep())),
        )
        .param(
            ParamSpec::new("tag")
                .of::<String>()
                .default_value("static".to_string()),
        )
        .returns::<String>()
        .sync_body(|args: Args| {
            Ok(format!(
                "{}|{}|{}|{}|{}",
                args.require::<User>("user")?.0,
                args.require::<i64>("id")?,
                args.require::<i64>("timeout")?,
                args.require::<String>("dep")?,
                args.require::<String>("tag")?
            ))
        })
}

#[tokio::test]
async fn should_resolve_the_documented_handler() {
    let context = handler_context();
    let bound = inject(&handler(), &context, None, InjectOptions::default())
        .await
        .unwrap();
    assert!(bound.is_complete());

    let result = bound.call().await.unwrap();
    assert_eq!(
        result.cloned::<String>().unwrap(),
        "Alice|42|30|Alice-99-30-True|static"
    );
}

#[tokio::test]
async fn should_prefer_by_name_over_by_type() {
    let target = Callable::builder("target")
        .param(ParamSpec::new("b").of::<String>())
        .sync_body(|args: Args| args.require_cloned::<String>("b"));

    let mut context = Context::new();
    context.insert_named("b", "by_name".to_string());
    context.insert_typed("by_type".to_string());

    let result = inject(&target, &context, None, InjectOptions::default())
        .await
        .unwrap()
        .call()
        .await
        .unwrap();
    assert_eq!(result.cloned::<String>().unwrap(), "by_name");
}

#[tokio::test]
async fn should_return_the_same_default_on_repeated_calls() {
    let target = Callable::builder("target")
        .param(
            ParamSpec::new("greeting")
                .of::<String>()
                .default_value("hello".to_string()),
        )
        .sync_body(|args: Args| args.require_cloned::<String>("greeting"));

    for _ in 0..3 {
        let result = inject(&target, &Context::new(), None, InjectOptions::default())
            .await
            .unwrap()
            .call()
            .await
            .unwrap();
        assert_eq!(result.cloned::<String>().unwrap(), "hello");
    }
}

#[tokio::test]
async fn should_fail_strict_resolution_with_missing_arguments() {
    let target = Callable::builder("target")
        .param(ParamSpec::new("absent").of::<String>())
        .sync_body(|args: Args| args.require_cloned::<String>("absent"));

    let options = InjectOptions {
        allow_incomplete: false,
        ..InjectOptions::default()
    };
    let error = inject(&target, &Context::new(), None, options)
        .await
        .unwrap_err();
    assert_eq!(error, InjectError::Unresolved(vec!["absent".to_string()]));
}
