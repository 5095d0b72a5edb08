//! Structural compatibility between two versions of a type or function.
//!
//! The diff classifies a change as `NoChange`, `BackwardCompatible`, or
//! `NotCompatible`; composite nodes join their children's results under the
//! ordering `NoChange < BackwardCompatible < NotCompatible`. The
//! classification drives version assignment: compatible changes bump the
//! minor, incompatible changes bump the major once the entity has been
//! released (major >= 1).

use std::collections::HashMap;

use crate::ast::{Funcdef, Type, Typedef};
use crate::ident::SemanticVersion;

/// Outcome of a structural diff, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Change {
    NoChange,
    BackwardCompatible,
    NotCompatible,
}

impl Change {
    /// The more severe of two outcomes.
    pub fn join(self, other: Change) -> Change {
        self.max(other)
    }
}

/// Diff two named definitions: the names must match, then the aliased
/// types are compared structurally.
pub fn find_typedef_change(old: &Typedef, new: &Typedef) -> Change {
    if old.name != new.name {
        return Change::NotCompatible;
    }
    find_change(&old.alias_type, &new.alias_type)
}

/// Diff two type nodes.
///
/// Comments never participate; annotation text on scalars does. Mapping
/// keys are always strings, so only the value type is compared.
pub fn find_change(old: &Type, new: &Type) -> Change {
    match (old, new) {
        (Type::Typedef(old), Type::Typedef(new)) => find_typedef_change(old, new),
        (Type::List(old), Type::List(new)) => find_change(old, new),
        (Type::Mapping { value: old, .. }, Type::Mapping { value: new, .. }) => {
            find_change(old, new)
        }
        (Type::Tuple(old), Type::Tuple(new)) => {
            if old.len() != new.len() {
                return Change::NotCompatible;
            }
            let mut ret = Change::NoChange;
            for (old_elem, new_elem) in old.iter().zip(new) {
                ret = ret.join(find_change(old_elem, new_elem));
                if ret == Change::NotCompatible {
                    return ret;
                }
            }
            ret
        }
        (Type::Scalar(old), Type::Scalar(new)) => {
            if old.kind != new.kind || old.id_reference != new.id_reference {
                Change::NotCompatible
            } else {
                Change::NoChange
            }
        }
        (Type::UnspecifiedObject, Type::UnspecifiedObject) => Change::NoChange,
        (Type::Struct(old), Type::Struct(new)) => {
            let mut new_fields: HashMap<&str, &crate::ast::StructItem> =
                new.items.iter().map(|i| (i.name.as_str(), i)).collect();
            let mut ret = Change::NoChange;
            for old_item in &old.items {
                let new_item = match new_fields.remove(old_item.name.as_str()) {
                    Some(item) => item,
                    None => return Change::NotCompatible,
                };
                ret = ret.join(find_change(&old_item.item_type, &new_item.item_type));
                if ret == Change::NotCompatible {
                    return ret;
                }
                if old_item.optional != new_item.optional {
                    return Change::NotCompatible;
                }
            }
            for added in new_fields.values() {
                if !added.optional {
                    return Change::NotCompatible;
                }
                ret = ret.join(Change::BackwardCompatible);
            }
            ret
        }
        _ => Change::NotCompatible,
    }
}

/// Diff two function definitions: arities must match, then parameters and
/// returns are compared pairwise.
pub fn find_func_change(old: &Funcdef, new: &Funcdef) -> Change {
    if old.parameters.len() != new.parameters.len() || old.returns.len() != new.returns.len() {
        return Change::NotCompatible;
    }
    let mut ret = Change::NoChange;
    for (old_param, new_param) in old.parameters.iter().zip(&new.parameters) {
        ret = ret.join(find_change(&old_param.param_type, &new_param.param_type));
        if ret == Change::NotCompatible {
            return ret;
        }
    }
    for (old_ret, new_ret) in old.returns.iter().zip(&new.returns) {
        ret = ret.join(find_change(&old_ret.param_type, &new_ret.param_type));
        if ret == Change::NotCompatible {
            return ret;
        }
    }
    ret
}

/// Next version for an entity.
///
/// A new entity starts at `0.1`. An incompatible change bumps the major
/// only once the entity is released (major >= 1); before release every
/// change bumps the minor.
pub fn next_version(previous: Option<SemanticVersion>, not_backward_compatible: bool) -> SemanticVersion {
    match previous {
        None => SemanticVersion::DEFAULT,
        Some(prev) => {
            if prev.major > 0 && not_backward_compatible {
                SemanticVersion::new(prev.major + 1, 0)
            } else {
                SemanticVersion::new(prev.major, prev.minor + 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Scalar, ScalarKind, StructItem, StructType};

    fn int() -> Type {
        Type::Scalar(Scalar::new(ScalarKind::Int))
    }

    fn string() -> Type {
        Type::Scalar(Scalar::new(ScalarKind::String))
    }

    fn structure(items: Vec<(&str, Type, bool)>) -> Type {
        Type::Struct(StructType {
            items: items
                .into_iter()
                .map(|(name, item_type, optional)| StructItem {
                    name: name.into(),
                    item_type,
                    optional,
                })
                .collect(),
        })
    }

    #[test]
    fn test_identical_is_no_change() {
        let samples = vec![
            int(),
            Type::List(Box::new(string())),
            Type::Mapping {
                key: Box::new(string()),
                value: Box::new(int()),
            },
            Type::Tuple(vec![int(), string()]),
            Type::UnspecifiedObject,
            structure(vec![("x", int(), false), ("y", string(), true)]),
        ];
        for t in samples {
            assert_eq!(find_change(&t, &t), Change::NoChange, "{}", t.kind_name());
        }
    }

    #[test]
    fn test_different_kinds_not_compatible() {
        assert_eq!(
            find_change(&int(), &Type::List(Box::new(int()))),
            Change::NotCompatible
        );
    }

    #[test]
    fn test_scalar_kind_change() {
        assert_eq!(find_change(&int(), &string()), Change::NotCompatible);
    }

    #[test]
    fn test_id_annotation_change() {
        let old = Type::Scalar(Scalar::with_id_reference(ScalarKind::String, "ws"));
        let new_same = Type::Scalar(Scalar::with_id_reference(ScalarKind::String, "ws"));
        let new_other = Type::Scalar(Scalar::with_id_reference(ScalarKind::String, "shock"));
        let new_none = string();
        assert_eq!(find_change(&old, &new_same), Change::NoChange);
        assert_eq!(find_change(&old, &new_other), Change::NotCompatible);
        assert_eq!(find_change(&old, &new_none), Change::NotCompatible);
    }

    #[test]
    fn test_struct_add_optional_field() {
        let old = structure(vec![("x", int(), false)]);
        let new = structure(vec![("x", int(), false), ("y", int(), true)]);
        assert_eq!(find_change(&old, &new), Change::BackwardCompatible);
    }

    #[test]
    fn test_struct_add_required_field() {
        let old = structure(vec![("x", int(), false)]);
        let new = structure(vec![("x", int(), false), ("y", int(), false)]);
        assert_eq!(find_change(&old, &new), Change::NotCompatible);
    }

    #[test]
    fn test_struct_remove_field() {
        let old = structure(vec![("x", int(), false), ("y", int(), true)]);
        let new = structure(vec![("x", int(), false)]);
        assert_eq!(find_change(&old, &new), Change::NotCompatible);
    }

    #[test]
    fn test_struct_optionality_flip() {
        let old = structure(vec![("x", int(), false)]);
        let new = structure(vec![("x", int(), true)]);
        assert_eq!(find_change(&old, &new), Change::NotCompatible);
    }

    #[test]
    fn test_struct_rename_field() {
        let old = structure(vec![("x", int(), false)]);
        let new = structure(vec![("z", int(), false)]);
        assert_eq!(find_change(&old, &new), Change::NotCompatible);
    }

    #[test]
    fn test_tuple_reorder() {
        let old = Type::Tuple(vec![int(), string()]);
        let new = Type::Tuple(vec![string(), int()]);
        assert_eq!(find_change(&old, &new), Change::NotCompatible);
    }

    #[test]
    fn test_tuple_arity_change() {
        let old = Type::Tuple(vec![int(), string()]);
        let new = Type::Tuple(vec![int(), string(), int()]);
        assert_eq!(find_change(&old, &new), Change::NotCompatible);
    }

    #[test]
    fn test_mapping_key_type_is_ignored() {
        // Keys are always strings in the language; the diff asserts this by
        // recursing only into the value type.
        let old = Type::Mapping {
            key: Box::new(string()),
            value: Box::new(int()),
        };
        let new = Type::Mapping {
            key: Box::new(string()),
            value: Box::new(int()),
        };
        assert_eq!(find_change(&old, &new), Change::NoChange);
    }

    #[test]
    fn test_func_change_rules() {
        use crate::ast::{Funcdef, Parameter};
        let f = |params: Vec<Type>, rets: Vec<Type>| Funcdef {
            name: "f".into(),
            comment: String::new(),
            parameters: params
                .into_iter()
                .map(|t| Parameter {
                    name: None,
                    param_type: t,
                })
                .collect(),
            returns: rets
                .into_iter()
                .map(|t| Parameter {
                    name: None,
                    param_type: t,
                })
                .collect(),
        };
        let old = f(vec![int()], vec![string()]);
        assert_eq!(find_func_change(&old, &f(vec![int()], vec![string()])), Change::NoChange);
        assert_eq!(
            find_func_change(&old, &f(vec![int(), int()], vec![string()])),
            Change::NotCompatible
        );
        assert_eq!(
            find_func_change(&old, &f(vec![string()], vec![string()])),
            Change::NotCompatible
        );
    }

    #[test]
    fn test_next_version_rules() {
        assert_eq!(next_version(None, false), SemanticVersion::new(0, 1));
        assert_eq!(next_version(None, true), SemanticVersion::new(0, 1));
        // pre-release: incompatible still bumps minor only
        assert_eq!(
            next_version(Some(SemanticVersion::new(0, 3)), true),
            SemanticVersion::new(0, 4)
        );
        assert_eq!(
            next_version(Some(SemanticVersion::new(1, 0)), false),
            SemanticVersion::new(1, 1)
        );
        assert_eq!(
            next_version(Some(SemanticVersion::new(1, 4)), true),
            SemanticVersion::new(2, 0)
        );
    }
}
