//! In-memory schema model and inspection results.

pub mod model;
pub mod results;

pub use model::{
    Catalog, Check, Column, ColumnReference, Database, Deferrability, ForeignKey, Index, MetaData,
    MetaDataType, PrimaryKey, QualifiedName, ReferentialAction, Schema, Sequence, Table,
};
pub use results::{InspectionResults, ObjectRef};
