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

//! Parsing and mapping of `qstat` job reports.

pub mod emitter;
pub mod parser;
pub mod record;
pub mod status;

pub use emitter::{CollectionPass, Disposition, EmitSummary, MappingWarning};
pub use parser::{
    HeaderDetection, ParseError, ParseWarning, ParserOptions, TableParser, DEFAULT_IDLE_TIMEOUT,
    MIN_RECORD_FIELDS,
};
pub use record::{Column, FieldRecord, FIELD_COUNT};
pub use status::{OutOfQueueFilter, StatusTable};
