use super::{existing, id_or_new, TableHandler};
use crate::cache::row::{self, Predicate};
use crate::cascade;
use crate::entity::{Category, Entity, Property};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use crate::property::ValueType;
use rusqlite::Connection;

impl TableHandler for Category {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_category()
    }

    fn set(conn: &Connection, id: &str, mut category: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if category.name.trim().is_empty() {
            return Err(CoreError::invalid_name("category name must not be empty"));
        }
        let owner = row::find::<Property>(conn, &[category.property_id.as_str()])?
            .ok_or_else(|| {
                CoreError::invalid_data(format!("no property with id {}", category.property_id))
            })?;
        if owner.value_type != ValueType::Categorical.as_str() {
            return Err(CoreError::invalid_data(format!(
                "property {} is {}, not categorical",
                owner.name, owner.value_type
            )));
        }

        if let Some(previous) = existing::<Category>(conn, id)? {
            if previous.property_id != category.property_id {
                return Err(CoreError::invalid_data("a category cannot move to another property"));
            }
        }
        category.id = id_or_new(id);

        let same_name: Vec<Category> = row::select(
            conn,
            &[
                Predicate::text("property_id", &category.property_id),
                Predicate::text("name", &category.name),
            ],
        )?;
        if same_name.iter().any(|other| other.id != category.id) {
            return Err(CoreError::duplicate_name("categories", &category.name));
        }

        row::upsert(conn, &category)?;
        batch.upsert(&category)?;
        Ok(category)
    }

    fn delete(conn: &Connection, id: &str, batch: &mut MirrorBatch) -> CoreResult<bool> {
        Ok(cascade::delete_category(conn, id, batch)?.is_some())
    }
}
