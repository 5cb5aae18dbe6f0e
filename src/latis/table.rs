//! Tabular results returned by the LaTiS server.
//!
//! A [`TabularResult`] is the row/column image of one response: an ordered list of column
//! names (`parameters`, index 0 being the row key), the rows themselves aligned with those
//! names, and a free-form `metadata` map. Every row has the same length as `parameters`.
//!
//! Three output formats are decoded:
//!
//! * `jsond`: JSON object, bare or wrapped in a single dataset-named object
//! * `csv`: header row followed by data rows
//! * `txt`: data rows only, columns named after the requested selection

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::maven_errors::MavenError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TabularResult {
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TabularResult {
    /// Build a table and check that every row matches the column count.
    pub fn new(
        parameters: Vec<String>,
        data: Vec<Vec<Value>>,
        metadata: Map<String, Value>,
    ) -> Result<Self, MavenError> {
        let table = TabularResult {
            parameters,
            data,
            metadata,
        };
        table.validate()?;
        Ok(table)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Index of a column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p == name)
    }

    /// Indices of a group of columns that only make sense together (a vector, a matrix).
    ///
    /// If any one of them is missing, the whole group is reported missing.
    pub fn column_indices<S: AsRef<str>>(&self, names: &[S]) -> Option<Vec<usize>> {
        names
            .iter()
            .map(|name| self.column_index(name.as_ref()))
            .collect()
    }

    /// All values of one column, in row order.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.data.iter().filter_map(move |row| row.get(index))
    }

    fn validate(&self) -> Result<(), MavenError> {
        let width = self.parameters.len();
        match self.data.iter().position(|row| row.len() != width) {
            Some(index) => Err(MavenError::MalformedTable(format!(
                "row {index} has {} values for {width} parameters",
                self.data[index].len()
            ))),
            None => Ok(()),
        }
    }

    /// Decode a `jsond` response.
    ///
    /// An empty response (no `parameters`) decodes into an empty table.
    pub fn from_jsond(text: &str) -> Result<Self, MavenError> {
        let value: Value = serde_json::from_str(text)?;
        let value = match value {
            Value::Object(map) if is_table_object(&map) => Value::Object(map),
            Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
                Some((_, inner @ Value::Object(_))) => inner,
                Some((_, other)) => {
                    return Err(MavenError::MalformedTable(format!(
                        "expected a table object, found {other}"
                    )))
                }
                None => Value::Object(Map::new()),
            },
            Value::Object(map) if map.is_empty() => Value::Object(map),
            other => {
                return Err(MavenError::MalformedTable(format!(
                    "expected a table object, found {other}"
                )))
            }
        };
        let table: TabularResult = serde_json::from_value(value)?;
        table.validate()?;
        Ok(table)
    }

    /// Decode a `csv` (with header) or `txt` (without header) response.
    ///
    /// Arguments
    /// ---------
    /// * `text`: the raw response body
    /// * `has_header`: whether the first record names the columns
    /// * `selection`: the requested column names, used when there is no header
    pub fn from_delimited(
        text: &str,
        has_header: bool,
        selection: &[String],
    ) -> Result<Self, MavenError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(has_header)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut parameters: Vec<String> = if has_header {
            reader.headers()?.iter().map(str::to_string).collect()
        } else {
            selection.to_vec()
        };

        let mut data = Vec::new();
        for record in reader.records() {
            let record = record?;
            data.push(record.iter().map(parse_cell).collect::<Vec<Value>>());
        }

        // a txt response for an empty selection returns every column, unnamed
        if parameters.is_empty() {
            if let Some(first) = data.first() {
                parameters = (0..first.len()).map(|i| format!("column_{i}")).collect();
            }
        }

        TabularResult::new(parameters, data, Map::new())
    }
}

fn is_table_object(map: &Map<String, Value>) -> bool {
    map.contains_key("parameters") || map.contains_key("data")
}

fn parse_cell(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    match field.parse::<f64>() {
        Ok(x) => Number::from_f64(x).map_or(Value::Null, Value::Number),
        Err(_) => Value::String(field.to_string()),
    }
}

/// Read a numeric cell; `null`, non-numeric and NaN cells are invalid.
pub fn cell_f64(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64().filter(|x| !x.is_nan()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| !x.is_nan()),
        _ => None,
    }
}

/// [`cell_f64`] on `row[index]`, `None` when the row is too short.
pub fn row_f64(row: &[Value], index: usize) -> Option<f64> {
    row.get(index).and_then(cell_f64)
}
