use super::{CodeModel, NodeId};

/// Double-dispatch traversal over the code model.
///
/// [`CodeModel::accept`] calls the method matching the entity kind. The
/// default package and type visits descend into children, so an
/// implementation only overrides the hooks it cares about and calls
/// `walk_package` / `walk_type` to keep descending.
pub trait Visitor {
    fn visit_package(&mut self, model: &CodeModel, package: NodeId) {
        walk_package(self, model, package);
    }

    fn visit_type(&mut self, model: &CodeModel, ty: NodeId) {
        walk_type(self, model, ty);
    }

    fn visit_function(&mut self, _model: &CodeModel, _function: NodeId) {}

    fn visit_method(&mut self, _model: &CodeModel, _method: NodeId) {}
}

pub fn walk_package<V: Visitor + ?Sized>(visitor: &mut V, model: &CodeModel, package: NodeId) {
    for ty in model.types(package) {
        model.accept(ty, visitor);
    }
    for function in model.functions(package) {
        model.accept(function, visitor);
    }
}

pub fn walk_type<V: Visitor + ?Sized>(visitor: &mut V, model: &CodeModel, ty: NodeId) {
    for method in model.functions(ty) {
        model.accept(method, visitor);
    }
}
