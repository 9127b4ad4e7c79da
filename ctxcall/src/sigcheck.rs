//! Static pre-flight checks for injectable signatures.
//!
//! [signature_check] inspects a target callable without any context and
//! reports, as human-readable strings, every parameter which could never be
//! injected: missing type declarations, duplicate markers, parameters with
//! no strategy at all, model-field type mismatches and incompatible
//! dependency return types. It never fails itself; it is meant to run once
//! during development or test setup, outside the resolution hot path.

use itertools::Itertools;

use crate::callable::Callable;
use crate::injectable::Marker;
use crate::validate::converters;
use crate::value::TypeKey;

fn error_msg(param: &str, message: &str) -> String {
    format!("Argument '{param}' error: {message}")
}

fn compatible(source: TypeKey, target: TypeKey) -> bool {
    source == target || converters().contains(source.id(), target.id())
}

/// Checks every parameter of `target` against the injection rules.
/// `model_types` lists the types which may be injected implicitly as models
/// even without an explicit marker.
pub fn signature_check(target: &Callable, model_types: &[TypeKey]) -> Vec<String> {
    target
        .params()
        .iter()
        .filter_map(|param| {
            let name = param.name();

            let marker = match param.primary_marker() {
                Ok(marker) => marker,
                Err(_) => {
                    return Some(error_msg(name, "multiple injectable markers declared"));
                }
            };

            if param.ty().is_none() && !matches!(marker, Some(Marker::DefaultValue(_))) {
                return Some(error_msg(name, "no type definition"));
            }

            match marker {
                Some(Marker::Depends(sub)) => {
                    let Some(returns) = sub.returns() else {
                        return Some(error_msg(
                            name,
                            "dependency return type cannot be determined",
                        ));
                    };
                    match param.ty() {
                        Some(ty) if !compatible(returns, ty) => Some(error_msg(
                            name,
                            &format!(
                                "dependency returns \"{returns}\" which is incompatible with \"{ty}\""
                            ),
                        )),
                        _ => None,
                    }
                }
                Some(Marker::ModelField { model, field_ty, .. }) => {
                    match (field_ty, param.ty()) {
                        (Some(field_ty), Some(ty)) if !compatible(*field_ty, ty) => {
                            Some(error_msg(
                                name,
                                &format!(
                                    "field of \"{model}\" has type \"{field_ty}\" which is incompatible with \"{ty}\""
                                ),
                            ))
                        }
                        _ => None,
                    }
                }
                Some(_) => None,
                None => {
                    let implicit_model = param
                        .ty()
                        .map(|ty| model_types.contains(&ty))
                        .unwrap_or(false);
                    if implicit_model || param.default().is_some() {
                        None
                    } else {
                        Some(error_msg(name, "cannot be injected"))
                    }
                }
            }
        })
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use crate::callable::Callable;
    use crate::injectable::{Marker, ParamSpec};
    use crate::sigcheck::signature_check;
    use crate::value::{Args, TypeKey};

    struct Settings;

    fn body(args: Args) -> Result<i64, crate::error::InjectError> {
        args.require_cloned::<i64>("x")
    }

    #[test]
    fn should_accept_well_formed_signatures() {
        let dep = Callable::builder("dep").returns::<i64>().sync_body(|_| Ok(1_i64));
        let target = Callable::builder("target")
            .param(ParamSpec::new("x").of::<i64>().with(Marker::depends(dep)))
            .param(ParamSpec::new("settings").of::<Settings>())
            .param(ParamSpec::new("retries").of::<i64>().default_value(3_i64))
            .sync_body(body);

        assert!(signature_check(&target, &[TypeKey::of::<Settings>()]).is_empty());
    }

    #[test]
    fn should_report_untyped_parameters() {
        let target = Callable::builder("target")
            .param(ParamSpec::new("x"))
            .sync_body(body);

        let errors = signature_check(&target, &[]);
        assert_eq!(errors, vec!["Argument 'x' error: no type definition"]);
    }

    #[test]
    fn should_report_uninjectable_parameters() {
        let target = Callable::builder("target")
            .param(ParamSpec::new("x").of::<i64>())
            .sync_body(body);

        let errors = signature_check(&target, &[]);
        assert_eq!(errors, vec!["Argument 'x' error: cannot be injected"]);
    }

    #[test]
    fn should_report_duplicate_markers() {
        let target = Callable::builder("target")
            .param(
                ParamSpec::new("x")
                    .of::<i64>()
                    .with(Marker::ByName)
                    .with(Marker::ByType),
            )
            .sync_body(body);

        let errors = signature_check(&target, &[]);
        assert_eq!(
            errors,
            vec!["Argument 'x' error: multiple injectable markers declared"]
        );
    }

    #[test]
    fn should_report_incompatible_dependency_returns() {
        let dep = Callable::builder("dep")
            .returns::<String>()
            .sync_body(|_| Ok("one".to_string()));
        let untyped_dep = Callable::builder("untyped").sync_body(|_| Ok(1_i64));

        let target = Callable::builder("target")
            .param(ParamSpec::new("x").of::<i64>().with(Marker::depends(dep)))
            .param(ParamSpec::new("y").of::<i64>().with(Marker::depends(untyped_dep)))
            .sync_body(body);

        let errors = signature_check(&target, &[]);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("incompatible"));
        assert!(errors[1].contains("cannot be determined"));
    }

    #[test]
    fn should_report_model_field_type_mismatches() {
        let target = Callable::builder("target")
            .param(
                ParamSpec::new("timeout")
                    .of::<i64>()
                    .with(Marker::model_field_named::<Settings, _>("timeout").field_ty::<Settings>()),
            )
            .sync_body(body);

        let errors = signature_check(&target, &[]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("incompatible"));
    }

    #[test]
    fn should_allow_convertible_dependency_returns() {
        // a String return satisfies a Uuid parameter through the converter table
        let dep = Callable::builder("dep")
            .returns::<String>()
            .sync_body(|_| Ok("3cd4d94e-61e9-4c90-bd39-9207a1fb7227".to_string()));
        let target = Callable::builder("target")
            .param(ParamSpec::new("id").of::<uuid::Uuid>().with(Marker::depends(dep)))
            .sync_body(|args: Args| args.require_cloned::<uuid::Uuid>("id"));

        assert!(signature_check(&target, &[]).is_empty());
    }
}
