//! Render call discovery

use super::{Callee, Expr, ExprKind, ObjectId, Unit};
use crate::diagnostic::Location;
use crate::host::TypeId;

/// A render call whose receiver is a template variable
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub receiver: ObjectId,
    /// Literal template name; `None` renders the receiver's own template
    pub template: Option<String>,
    pub data: TypeId,
    pub pos: Location,
}

/// Find `ExecuteTemplate(w, "name", data)` calls, and `Execute(w, data)`
/// calls when `execute_calls` is set, on template-typed variables
pub fn scan(unit: &Unit, execute_calls: bool) -> Vec<PendingCall> {
    unit.exprs()
        .filter_map(|expr| render_call(unit, expr, execute_calls))
        .collect()
}

fn render_call(unit: &Unit, expr: &Expr, execute_calls: bool) -> Option<PendingCall> {
    let ExprKind::Call {
        callee: Callee::Method { receiver, name },
        args,
    } = &expr.kind
    else {
        return None;
    };
    unit.template_variant(receiver.ty)?;
    let ExprKind::Ident {
        object: Some(object), ..
    } = &receiver.kind
    else {
        return None;
    };

    let (template, data) = match (name.as_str(), args.as_slice()) {
        ("ExecuteTemplate", [_, template, data]) => {
            let Some(literal) = template.literal() else {
                tracing::debug!(pos = %expr.pos, "skipping render call with a non-literal template name");
                return None;
            };
            (Some(literal.to_string()), data)
        }
        ("Execute", [_, data]) if execute_calls => (None, data),
        _ => return None,
    };
    Some(PendingCall {
        receiver: *object,
        template,
        data: data.ty,
        pos: expr.pos.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Variant;
    use crate::unit::Stmt;

    fn render(unit: &mut Unit, method: &str, receiver_ty: TypeId, template: Option<Expr>) -> (ObjectId, Expr) {
        let ts = unit.object();
        let mut args = vec![Expr::opaque(TypeId::ANY)];
        args.extend(template);
        args.push(Expr::opaque(TypeId::STRING));
        let call = Expr::method_call(Expr::ident("ts", ts, receiver_ty), method, args, TypeId::ERROR)
            .at("main.go", 12, 2);
        (ts, call)
    }

    #[test]
    fn test_execute_template_with_literal_name() {
        let mut unit = Unit::new("app");
        let ty = unit.template_type(Variant::Html);
        let (ts, call) = render(&mut unit, "ExecuteTemplate", ty, Some(Expr::string("page")));
        unit.add_file("main.go", vec![Stmt::Expr(call)]);
        assert_eq!(
            scan(&unit, true),
            vec![PendingCall {
                receiver: ts,
                template: Some("page".to_string()),
                data: TypeId::STRING,
                pos: Location::new("main.go", 12, 2),
            }]
        );
    }

    #[test]
    fn test_non_literal_names_and_foreign_receivers_are_skipped() {
        let mut unit = Unit::new("app");
        let ty = unit.template_type(Variant::Text);
        let (_, dynamic) = render(&mut unit, "ExecuteTemplate", ty, Some(Expr::opaque(TypeId::STRING)));
        let (_, foreign) = render(&mut unit, "ExecuteTemplate", TypeId::ANY, Some(Expr::string("x")));
        unit.add_file("main.go", vec![Stmt::Expr(dynamic), Stmt::Expr(foreign)]);
        assert!(scan(&unit, true).is_empty());
    }

    #[test]
    fn test_execute_calls_are_optional() {
        let mut unit = Unit::new("app");
        let ty = unit.template_type(Variant::Text);
        let (_, call) = render(&mut unit, "Execute", ty, None);
        unit.add_file("main.go", vec![Stmt::Block(vec![Stmt::Expr(call)])]);
        assert_eq!(scan(&unit, true).len(), 1);
        assert_eq!(scan(&unit, true)[0].template, None);
        assert!(scan(&unit, false).is_empty());
    }
}
