//! Parse the DDL column lists (`name TYPE [NOT NULL] [COMMENT '...'], ...`) that describe the
//! raw files into arrow schemas.

use std::{collections::HashMap, sync::Arc};

use arrow::datatypes::{DECIMAL128_MAX_PRECISION, DataType, Field, Schema, SchemaRef, TimeUnit};
use datafusion::sql::sqlparser::{
    ast::{ColumnDef, ColumnOption, DataType as SqlDataType, ExactNumberInfo},
    dialect::GenericDialect,
    parser::Parser,
    tokenizer::Token,
};

use crate::{Error, Result};

/// Field metadata key holding a column's `COMMENT`.
pub const COMMENT_METADATA_KEY: &str = "comment";

const DEFAULT_DECIMAL_PRECISION: u8 = 10;

/// Parse a DDL column list into a schema. Columns are nullable unless declared `NOT NULL`.
pub fn parse_schema(ddl: &str) -> Result<SchemaRef> {
    let invalid = |reason: String| Error::InvalidSchema {
        column: ddl.trim().to_owned(),
        reason,
    };

    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(ddl)
        .map_err(|e| invalid(e.to_string()))?;
    let mut fields = vec![];
    loop {
        let column = parser
            .parse_column_def()
            .map_err(|e| invalid(e.to_string()))?;
        fields.push(column_field(column)?);
        if !parser.consume_token(&Token::Comma) {
            break;
        }
    }
    let next = parser.peek_token().token;
    if next != Token::EOF {
        return Err(invalid(format!("unexpected {next} after column definition")));
    }

    Ok(Arc::new(Schema::new(fields)))
}

fn column_field(column: ColumnDef) -> Result<Field> {
    let name = column.name.value;
    let invalid = |reason: String| Error::InvalidSchema {
        column: name.clone(),
        reason,
    };

    let data_type = arrow_type(&column.data_type)
        .ok_or_else(|| invalid(format!("unsupported type {}", column.data_type)))?;
    let mut nullable = true;
    let mut metadata = HashMap::new();
    for def in column.options {
        match def.option {
            ColumnOption::NotNull => nullable = false,
            ColumnOption::Null => nullable = true,
            ColumnOption::Comment(comment) => {
                metadata.insert(COMMENT_METADATA_KEY.to_owned(), comment);
            }
            other => return Err(invalid(format!("unsupported column option {other}"))),
        }
    }

    Ok(Field::new(name, data_type, nullable).with_metadata(metadata))
}

fn arrow_type(data_type: &SqlDataType) -> Option<DataType> {
    Some(match data_type {
        SqlDataType::String(_)
        | SqlDataType::Varchar(_)
        | SqlDataType::Char(_)
        | SqlDataType::Text => DataType::Utf8,
        SqlDataType::TinyInt(_) => DataType::Int8,
        SqlDataType::SmallInt(_) => DataType::Int16,
        SqlDataType::Int(_) | SqlDataType::Integer(_) => DataType::Int32,
        SqlDataType::BigInt(_) => DataType::Int64,
        SqlDataType::Float(_) | SqlDataType::Real => DataType::Float32,
        SqlDataType::Double | SqlDataType::DoublePrecision => DataType::Float64,
        SqlDataType::Boolean | SqlDataType::Bool => DataType::Boolean,
        SqlDataType::Date => DataType::Date32,
        SqlDataType::Timestamp(_, _) => DataType::Timestamp(TimeUnit::Microsecond, None),
        SqlDataType::Decimal(info) | SqlDataType::Numeric(info) => decimal(info)?,
        // Spark type names without a SQL keyword
        SqlDataType::Custom(name, modifiers) if modifiers.is_empty() => {
            match name.to_string().to_ascii_uppercase().as_str() {
                "LONG" => DataType::Int64,
                "SHORT" => DataType::Int16,
                "BYTE" => DataType::Int8,
                _ => return None,
            }
        }
        _ => return None,
    })
}

fn decimal(info: &ExactNumberInfo) -> Option<DataType> {
    let (precision, scale) = match *info {
        ExactNumberInfo::None => (DEFAULT_DECIMAL_PRECISION, 0),
        ExactNumberInfo::Precision(p) => (u8::try_from(p).ok()?, 0),
        ExactNumberInfo::PrecisionAndScale(p, s) => (u8::try_from(p).ok()?, i8::try_from(s).ok()?),
    };
    (precision > 0 && precision <= DECIMAL128_MAX_PRECISION && scale as u8 <= precision)
        .then_some(DataType::Decimal128(precision, scale))
}
