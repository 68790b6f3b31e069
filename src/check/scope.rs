//! Variable scopes for the checker

use crate::host::TypeId;

#[derive(Debug, Clone)]
struct Frame {
    dot: TypeId,
    vars: Vec<(String, TypeId)>,
}

/// A stack of variable frames, each with the dot type in effect
///
/// Frames are only entered through [`Scope::scoped`], so every push is
/// matched by a pop no matter how the body returns.
#[derive(Debug, Clone)]
pub struct Scope {
    frames: Vec<Frame>,
}

impl Scope {
    /// A root scope for a template executed with `dot`; `$` is bound to it
    pub fn new(dot: TypeId) -> Self {
        Self {
            frames: vec![Frame {
                dot,
                vars: vec![("$".to_string(), dot)],
            }],
        }
    }

    pub fn dot(&self) -> TypeId {
        self.frames.last().map_or(TypeId::INVALID, |f| f.dot)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Run `body` in a new frame whose dot is `dot`
    pub fn scoped<R>(&mut self, dot: TypeId, body: impl FnOnce(&mut Scope) -> R) -> R {
        self.frames.push(Frame {
            dot,
            vars: Vec::new(),
        });
        let result = body(self);
        self.frames.pop();
        result
    }

    /// Bind `name` in the innermost frame, shadowing outer bindings
    pub fn declare(&mut self, name: &str, ty: TypeId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.push((name.to_string(), ty));
        }
    }

    /// Update the innermost visible binding of `name`; `false` if undeclared
    pub fn assign(&mut self, name: &str, ty: TypeId) -> bool {
        let binding = self
            .frames
            .iter_mut()
            .rev()
            .flat_map(|f| f.vars.iter_mut().rev())
            .find(|(n, _)| n == name);
        match binding {
            Some((_, slot)) => {
                *slot = ty;
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.vars.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }
}
