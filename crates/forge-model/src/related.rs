//! Type-erased relation results cached on a model instance.
//!
//! A model's relation cache holds models of other types, so entries are stored
//! as `Box<dyn DynModel>` and downcast back on access.

use std::any::Any;
use std::fmt::Debug;

use crate::model::Model;

/// Object-safe view of any model.
pub trait DynModel: Any + Debug {
    /// For downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Clone behind the box.
    fn clone_box(&self) -> Box<dyn DynModel>;

    /// Table of the concrete model.
    fn dyn_table(&self) -> &'static str;

    /// JSON form, hidden attributes excluded.
    fn dyn_to_json(&self) -> serde_json::Value;
}

impl<M: Model> DynModel for M {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn DynModel> {
        Box::new(self.clone())
    }

    fn dyn_table(&self) -> &'static str {
        M::definition().table_name()
    }

    fn dyn_to_json(&self) -> serde_json::Value {
        self.to_json()
    }
}

impl Clone for Box<dyn DynModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A loaded relation: one optional model or a list.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<dyn DynModel>>),
    Many(Vec<Box<dyn DynModel>>),
}

impl Related {
    /// Wrap a single optional result.
    pub fn one<R: Model>(model: Option<R>) -> Self {
        Related::One(model.map(|m| Box::new(m) as Box<dyn DynModel>))
    }

    /// Wrap a list of results.
    pub fn many<R: Model, I: IntoIterator<Item = R>>(models: I) -> Self {
        Related::Many(
            models
                .into_iter()
                .map(|m| Box::new(m) as Box<dyn DynModel>)
                .collect(),
        )
    }

    /// The single result as `R`. `None` when empty, of another type, or a list.
    pub fn as_one<R: Model>(&self) -> Option<&R> {
        match self {
            Related::One(Some(m)) => m.as_any().downcast_ref::<R>(),
            _ => None,
        }
    }

    /// The list results that are of type `R`. A single result yields a
    /// one-element list.
    pub fn as_many<R: Model>(&self) -> Vec<&R> {
        match self {
            Related::One(m) => m
                .iter()
                .filter_map(|m| m.as_any().downcast_ref::<R>())
                .collect(),
            Related::Many(list) => list
                .iter()
                .filter_map(|m| m.as_any().downcast_ref::<R>())
                .collect(),
        }
    }

    /// Number of loaded models.
    pub fn len(&self) -> usize {
        match self {
            Related::One(m) => usize::from(m.is_some()),
            Related::Many(list) => list.len(),
        }
    }

    /// Whether nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON form: an object, `null`, or an array.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(None) => serde_json::Value::Null,
            Related::One(Some(m)) => m.dyn_to_json(),
            Related::Many(list) => {
                serde_json::Value::Array(list.iter().map(|m| m.dyn_to_json()).collect())
            }
        }
    }
}
