//! # Tool Requests
//!
//! Typed form of the eight document tools. [`DocumentRequest::from_tool_call`]
//! turns a tool name plus loosely-typed JSON arguments into a validated
//! request, and [`DocumentReply::summary`] renders a result as the one-line
//! text a tool caller gets back.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::{Document, DocumentDraft, DocumentPage, DocumentPatch, Pagination, SearchField};

/// Names of the tools this proxy serves
pub const TOOL_NAMES: [&str; 8] = [
    "create_document",
    "get_documents",
    "get_document",
    "update_document",
    "delete_document",
    "search_by_keyword",
    "search_by_title",
    "search_by_subtitle",
];

/// A validated document operation
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentRequest {
    CreateDocument(DocumentDraft),
    GetDocuments(Pagination),
    GetDocument { doc_id: String },
    UpdateDocument { doc_id: String, patch: DocumentPatch },
    DeleteDocument { doc_id: String },
    Search { field: SearchField, term: String, pagination: Pagination },
}

fn default_page() -> u32 {
    Pagination::default().page
}

fn default_per_page() -> u32 {
    Pagination::default().per_page
}

#[derive(Deserialize)]
struct PageArgs {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

#[derive(Deserialize)]
struct DocIdArgs {
    doc_id: Value,
}

#[derive(Deserialize)]
struct UpdateArgs {
    doc_id: Value,
    #[serde(flatten)]
    patch: DocumentPatch,
}

#[derive(Deserialize)]
struct SearchArgs {
    #[serde(alias = "keyword", alias = "title", alias = "subtitle")]
    term: String,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

impl DocumentRequest {
    /// Parse a tool invocation
    ///
    /// `arguments` may be `null` for tools whose arguments are all optional.
    pub fn from_tool_call(name: &str, arguments: Value) -> ProxyResult<Self> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let request = match name {
            "create_document" => {
                let draft: DocumentDraft = parse_args(arguments)?;
                draft.validate()?;
                Self::CreateDocument(draft)
            }
            "get_documents" => {
                let args: PageArgs = parse_args(arguments)?;
                Self::GetDocuments(Pagination::new(args.page, args.per_page)?)
            }
            "get_document" => {
                let args: DocIdArgs = parse_args(arguments)?;
                Self::GetDocument { doc_id: doc_id(args.doc_id)? }
            }
            "update_document" => {
                let args: UpdateArgs = parse_args(arguments)?;
                Self::UpdateDocument {
                    doc_id: doc_id(args.doc_id)?,
                    patch: args.patch,
                }
            }
            "delete_document" => {
                let args: DocIdArgs = parse_args(arguments)?;
                Self::DeleteDocument { doc_id: doc_id(args.doc_id)? }
            }
            "search_by_keyword" => search(SearchField::Keyword, arguments)?,
            "search_by_title" => search(SearchField::Title, arguments)?,
            "search_by_subtitle" => search(SearchField::Subtitle, arguments)?,
            other => {
                return Err(ProxyError::invalid_request(
                    "tool",
                    format!("unknown tool '{}'", other),
                ))
            }
        };
        Ok(request)
    }

    /// Tool name this request answers to
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::CreateDocument(_) => "create_document",
            Self::GetDocuments(_) => "get_documents",
            Self::GetDocument { .. } => "get_document",
            Self::UpdateDocument { .. } => "update_document",
            Self::DeleteDocument { .. } => "delete_document",
            Self::Search { field: SearchField::Keyword, .. } => "search_by_keyword",
            Self::Search { field: SearchField::Title, .. } => "search_by_title",
            Self::Search { field: SearchField::Subtitle, .. } => "search_by_subtitle",
        }
    }

    /// Whether the request changes origin state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateDocument(_) | Self::UpdateDocument { .. } | Self::DeleteDocument { .. }
        )
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> ProxyResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| ProxyError::invalid_request("arguments", e.to_string()))
}

/// Accept ids given as strings or numbers
fn doc_id(raw: Value) -> ProxyResult<String> {
    let id = match raw {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => {
            return Err(ProxyError::invalid_request(
                "doc_id",
                format!("expected string or number, found {}", other),
            ))
        }
    };
    if id.trim().is_empty() {
        return Err(ProxyError::invalid_request("doc_id", "must not be empty"));
    }
    Ok(id)
}

fn search(field: SearchField, arguments: Value) -> ProxyResult<DocumentRequest> {
    let args: SearchArgs = parse_args(arguments)?;
    if args.term.trim().is_empty() {
        return Err(ProxyError::invalid_request("term", "must not be empty"));
    }
    Ok(DocumentRequest::Search {
        field,
        term: args.term,
        pagination: Pagination::new(args.page, args.per_page)?,
    })
}

/// Result of a dispatched [`DocumentRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentReply {
    Created(Document),
    Listed(DocumentPage),
    Fetched(Document),
    Updated(Document),
    Deleted { doc_id: String },
    Searched { field: SearchField, term: String, page: DocumentPage },
}

impl DocumentReply {
    /// One-line text rendering for tool callers
    pub fn summary(&self) -> String {
        match self {
            Self::Created(doc) => format!("Document created: {}", render(doc)),
            Self::Listed(page) => format!(
                "Documents retrieved: {} documents (page {}, {} per page, {} total)",
                page.documents.len(),
                page.page,
                page.per_page,
                page.total
            ),
            Self::Fetched(doc) => format!("Document: {}", render(doc)),
            Self::Updated(doc) => format!("Document updated: {}", render(doc)),
            Self::Deleted { doc_id } => format!("Document {} deleted successfully", doc_id),
            Self::Searched { field, term, page } => format!(
                "Search by {} '{}': {} results",
                field.label(),
                term,
                page.total
            ),
        }
    }
}

fn render(doc: &Document) -> String {
    serde_json::to_string(doc).unwrap_or_else(|_| format!("{{\"id\":\"{}\"}}", doc.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_document_arguments() {
        let request = DocumentRequest::from_tool_call(
            "create_document",
            json!({"title": "T", "content": "C", "keywords": ["a"]}),
        )
        .unwrap();

        match request {
            DocumentRequest::CreateDocument(draft) => {
                assert_eq!(draft.title, "T");
                assert_eq!(draft.keywords, vec!["a".to_string()]);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_pagination_defaults_and_bounds() {
        assert_eq!(
            DocumentRequest::from_tool_call("get_documents", Value::Null).unwrap(),
            DocumentRequest::GetDocuments(Pagination::default())
        );

        let err = DocumentRequest::from_tool_call("get_documents", json!({"per_page": 500})).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest { ref field, .. } if field == "per_page"));
    }

    #[test]
    fn test_numeric_doc_id_is_accepted() {
        assert_eq!(
            DocumentRequest::from_tool_call("get_document", json!({"doc_id": 123})).unwrap(),
            DocumentRequest::GetDocument { doc_id: "123".to_string() }
        );
    }

    #[test]
    fn test_update_collects_patch_fields() {
        let request = DocumentRequest::from_tool_call(
            "update_document",
            json!({"doc_id": "7", "title": "T2"}),
        )
        .unwrap();

        assert_eq!(
            request,
            DocumentRequest::UpdateDocument {
                doc_id: "7".to_string(),
                patch: DocumentPatch {
                    title: Some("T2".to_string()),
                    ..Default::default()
                },
            }
        );
        assert!(request.is_mutation());
    }

    #[test]
    fn test_search_accepts_field_named_argument() {
        let request = DocumentRequest::from_tool_call("search_by_title", json!({"title": "rust"})).unwrap();
        assert_eq!(request.tool_name(), "search_by_title");

        let err = DocumentRequest::from_tool_call("search_by_keyword", json!({"term": "  "})).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest { .. }));
    }

    #[test]
    fn test_unknown_tool_and_bad_arguments() {
        assert!(DocumentRequest::from_tool_call("drop_database", json!({})).is_err());
        assert!(DocumentRequest::from_tool_call("get_document", json!({})).is_err());
        assert!(DocumentRequest::from_tool_call("create_document", json!({"title": ""})).is_err());
    }

    #[test]
    fn test_every_tool_name_round_trips() {
        for name in TOOL_NAMES {
            let args = match name {
                "create_document" => json!({"title": "T", "content": "C"}),
                "get_documents" => json!({}),
                "update_document" => json!({"doc_id": "1", "content": "x"}),
                n if n.starts_with("search_") => json!({"term": "x"}),
                _ => json!({"doc_id": "1"}),
            };
            let request = DocumentRequest::from_tool_call(name, args).unwrap();
            assert_eq!(request.tool_name(), name);
        }
    }

    #[test]
    fn test_summaries() {
        assert_eq!(
            DocumentReply::Deleted { doc_id: "9".to_string() }.summary(),
            "Document 9 deleted successfully"
        );

        let page = DocumentPage {
            documents: Vec::new(),
            total: 0,
            page: 1,
            per_page: 10,
        };
        assert_eq!(
            DocumentReply::Searched {
                field: SearchField::Keyword,
                term: "rust".to_string(),
                page,
            }
            .summary(),
            "Search by keyword 'rust': 0 results"
        );
    }
}
