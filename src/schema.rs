//! Fixed housing dataset schema

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::sync::Arc;

/// Longitude of the block group
pub const LONGITUDE: &str = "longitude";
/// Latitude of the block group
pub const LATITUDE: &str = "latitude";
/// Median house age in the block group
pub const HOUSING_MEDIAN_AGE: &str = "housing_median_age";
/// Total number of rooms
pub const TOTAL_ROOMS: &str = "total_rooms";
/// Total number of bedrooms (the column with missing values in the raw data)
pub const TOTAL_BEDROOMS: &str = "total_bedrooms";
/// Block group population
pub const POPULATION: &str = "population";
/// Number of households
pub const HOUSEHOLDS: &str = "households";
/// Median income, drives stratification
pub const MEDIAN_INCOME: &str = "median_income";
/// Regression label
pub const MEDIAN_HOUSE_VALUE: &str = "median_house_value";
/// Categorical feature
pub const OCEAN_PROXIMITY: &str = "ocean_proximity";
/// Derived stratum label, never a feature
pub const INCOME_CATEGORY: &str = "income_cat";

/// Numeric columns of the raw file, in file order
pub const NUMERIC_COLUMNS: [&str; 9] = [
    LONGITUDE,
    LATITUDE,
    HOUSING_MEDIAN_AGE,
    TOTAL_ROOMS,
    TOTAL_BEDROOMS,
    POPULATION,
    HOUSEHOLDS,
    MEDIAN_INCOME,
    MEDIAN_HOUSE_VALUE,
];

/// Arrow schema of the raw, train and test CSV files.
///
/// Numeric fields are nullable `Float64` (empty CSV cells load as nulls).
#[must_use]
pub fn housing_schema() -> SchemaRef {
    let mut fields: Vec<Field> = NUMERIC_COLUMNS
        .iter()
        .map(|name| Field::new(*name, DataType::Float64, true))
        .collect();
    fields.push(Field::new(OCEAN_PROXIMITY, DataType::Utf8, true));
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_housing_schema_order() {
        let schema = housing_schema();
        assert_eq!(schema.fields().len(), 10);
        assert_eq!(schema.field(0).name(), LONGITUDE);
        assert_eq!(schema.field(8).name(), MEDIAN_HOUSE_VALUE);
        assert_eq!(schema.field(9).name(), OCEAN_PROXIMITY);
        assert_eq!(schema.field(9).data_type(), &DataType::Utf8);
    }
}
