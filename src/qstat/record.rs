// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Column layout of a `qstat -u` report line.

use std::fmt;

/// Columns of a data line, in report order.
///
/// ```text
/// Job ID  Username  Queue  Jobname  SessID  NDS  TSK  Req'd Memory  Req'd Time  S  Elap Time
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    JobId = 0,
    Username,
    Queue,
    JobName,
    SessionId,
    Nodes,
    Tasks,
    RequestedMemory,
    RequestedTime,
    Status,
    ElapsedTime,
}

/// Number of columns a complete data line carries
pub const FIELD_COUNT: usize = 11;

impl Column {
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The whitespace-separated tokens of one data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    fields: Vec<String>,
}

impl FieldRecord {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Split a line on runs of whitespace.
    pub fn from_line(line: &str) -> Self {
        Self::new(line.split_whitespace().map(str::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, column: Column) -> Option<&str> {
        self.fields.get(column.index()).map(String::as_str)
    }

    pub fn job_id(&self) -> &str {
        self.get(Column::JobId).unwrap_or_default()
    }

    pub fn owner(&self) -> &str {
        self.get(Column::Username).unwrap_or_default()
    }

    pub fn job_name(&self) -> &str {
        self.get(Column::JobName).unwrap_or_default()
    }

    pub fn status(&self) -> &str {
        self.get(Column::Status).unwrap_or_default()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Joins the fields with `|`, the form used in warnings.
impl fmt::Display for FieldRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "2483314.host user1 single job1 8006 1 -- -- 01:00:00 C --";

    #[test]
    fn test_columns_by_position() {
        let record = FieldRecord::from_line(LINE);
        assert_eq!(record.len(), FIELD_COUNT);
        assert_eq!(record.job_id(), "2483314.host");
        assert_eq!(record.owner(), "user1");
        assert_eq!(record.get(Column::Queue), Some("single"));
        assert_eq!(record.job_name(), "job1");
        assert_eq!(record.get(Column::RequestedTime), Some("01:00:00"));
        assert_eq!(record.status(), "C");
        assert_eq!(record.get(Column::ElapsedTime), Some("--"));
    }

    #[test]
    fn test_runs_of_whitespace_collapse() {
        let record = FieldRecord::from_line("  a \t b    c  ");
        assert_eq!(record.fields(), ["a", "b", "c"]);
    }

    #[test]
    fn test_missing_columns_are_empty() {
        let record = FieldRecord::from_line("123.host alice");
        assert_eq!(record.status(), "");
        assert_eq!(record.get(Column::JobName), None);
    }

    #[test]
    fn test_display_joins_with_pipe() {
        let record = FieldRecord::from_line("a b  c");
        assert_eq!(record.to_string(), "a|b|c");
    }
}
