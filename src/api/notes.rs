//! Notes (`annotation` records) and their file attachments.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    contains_any, custom_fields, fetch_all, fetch_one, fetch_page, record_path,
    PaginatedResponse, PaginationParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{entity_set_name, ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "annotations";

const SELECT: &[&str] = &[
    "annotationid",
    "subject",
    "notetext",
    "_objectid_value",
    "objecttypecode",
    "isdocument",
    "filename",
    "mimetype",
    "filesize",
    "_ownerid_value",
    "_createdby_value",
    "createdon",
    "modifiedon",
];

const ATTACHMENT_SELECT: &[&str] = &["filename", "mimetype", "documentbody", "filesize"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationRecord {
    #[serde(default)]
    pub annotationid: String,
    pub subject: Option<String>,
    pub notetext: Option<String>,
    #[serde(rename = "_objectid_value")]
    pub objectid: Option<String>,
    pub objecttypecode: Option<String>,
    pub isdocument: Option<bool>,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
    pub filesize: Option<i64>,
    pub documentbody: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(rename = "_createdby_value")]
    pub createdby: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub subject: Option<String>,
    pub note_text: Option<String>,
    /// Record the note is attached to.
    pub object_id: Option<String>,
    /// Logical name of that record's entity.
    pub object_type_code: Option<String>,
    pub is_document: Option<bool>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub owner_id: Option<String>,
    pub created_by_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<AnnotationRecord> for Note {
    fn from(d: AnnotationRecord) -> Self {
        Self {
            id: d.annotationid,
            subject: d.subject,
            note_text: d.notetext,
            object_id: d.objectid,
            object_type_code: d.objecttypecode,
            is_document: d.isdocument,
            file_name: d.filename,
            mime_type: d.mimetype,
            file_size: d.filesize,
            owner_id: d.ownerid,
            created_by_id: d.createdby,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

/// Attachment content of a note. Empty strings and zero when the note has
/// no file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteAttachment {
    pub file_name: String,
    pub mime_type: String,
    /// Base64 file content
    pub document_body: String,
    pub file_size: i64,
}

impl From<AnnotationRecord> for NoteAttachment {
    fn from(d: AnnotationRecord) -> Self {
        Self {
            file_name: d.filename.unwrap_or_default(),
            mime_type: d.mimetype.unwrap_or_default(),
            document_body: d.documentbody.unwrap_or_default(),
            file_size: d.filesize.unwrap_or(0),
        }
    }
}

/// Checks that `body` is standard base64 and returns the decoded length.
pub fn decoded_size(body: &str) -> Result<usize, CrmError> {
    STANDARD
        .decode(body.trim())
        .map(|bytes| bytes.len())
        .map_err(|e| CrmError::InvalidInput(format!("documentBody is not valid base64: {}", e)))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteListParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    /// Only notes attached to this record
    #[serde(default)]
    pub regarding_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteCreateInput {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub note_text: Option<String>,
    /// Logical name of the record the note belongs to, e.g. `account`
    #[serde(default)]
    pub regarding_entity_type: Option<String>,
    #[serde(default)]
    pub regarding_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Base64 file content
    #[serde(default)]
    pub document_body: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl NoteCreateInput {
    pub fn to_wire(&self) -> WireBody {
        let is_document = self.file_name.is_some() || self.document_body.is_some();
        let mut body = WireBody::new()
            .field("subject", &self.subject)
            .field("notetext", &self.note_text)
            .value("isdocument", is_document)
            .field("filename", &self.file_name)
            .field("mimetype", &self.mime_type)
            .field("documentbody", &self.document_body);
        if let (Some(entity_type), Some(id)) = (
            self.regarding_entity_type.as_deref().filter(|t| !t.is_empty()),
            self.regarding_id.as_deref().filter(|id| !id.is_empty()),
        ) {
            body = body.bind_id(
                &format!("objectid_{}", entity_type),
                &entity_set_name(entity_type),
                id,
            );
        }
        body.custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdateInput {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub note_text: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Base64 file content; marks the note as a document
    #[serde(default)]
    pub document_body: Option<String>,
}

impl NoteUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        let body = WireBody::new()
            .field("subject", &self.subject)
            .field("notetext", &self.note_text)
            .field("filename", &self.file_name)
            .field("mimetype", &self.mime_type)
            .field("documentbody", &self.document_body);
        if self.document_body.is_some() {
            body.value("isdocument", true)
        } else {
            body
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInput {
    pub file_name: String,
    pub mime_type: String,
    /// Base64 file content
    pub document_body: String,
}

/// What was stored by an attachment upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSummary {
    pub note_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: usize,
}

/// Notes API client.
#[derive(Clone, Debug)]
pub struct NotesClient {
    odata: ODataClient,
}

impl NotesClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_notes(
        &self,
        params: &NoteListParams,
    ) -> Result<PaginatedResponse<Note>, CrmError> {
        let mut query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        if let Some(id) = params.regarding_id.as_deref().filter(|id| !id.is_empty()) {
            query = query.filter(format!("_objectid_value eq {}", id));
        }
        fetch_page::<AnnotationRecord, _>(&self.odata, ENTITY_SET, query, &params.pagination)
            .await
    }

    pub async fn get_note(&self, id: &str) -> Result<Note, CrmError> {
        fetch_one::<AnnotationRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_note(&self, input: &NoteCreateInput) -> Result<Note, CrmError> {
        if let Some(body) = &input.document_body {
            decoded_size(body)?;
        }
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_note(&created.id).await
    }

    pub async fn update_note(&self, id: &str, input: &NoteUpdateInput) -> Result<Note, CrmError> {
        if let Some(body) = &input.document_body {
            decoded_size(body)?;
        }
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_note(id).await
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn get_note_attachment(&self, id: &str) -> Result<NoteAttachment, CrmError> {
        fetch_one::<AnnotationRecord, _>(&self.odata, ENTITY_SET, id, ATTACHMENT_SELECT).await
    }

    /// Replaces whatever file the note carried.
    pub async fn add_attachment_to_note(
        &self,
        note_id: &str,
        input: &AttachmentInput,
    ) -> Result<AttachmentSummary, CrmError> {
        let size_bytes = decoded_size(&input.document_body)?;
        self.odata
            .patch(
                &record_path(ENTITY_SET, note_id),
                &json!({
                    "isdocument": true,
                    "filename": input.file_name,
                    "mimetype": input.mime_type,
                    "documentbody": input.document_body,
                }),
            )
            .await?;
        Ok(AttachmentSummary {
            note_id: note_id.to_string(),
            file_name: input.file_name.clone(),
            mime_type: input.mime_type.clone(),
            size_bytes,
        })
    }

    pub async fn remove_attachment_from_note(&self, note_id: &str) -> Result<(), CrmError> {
        self.odata
            .patch(
                &record_path(ENTITY_SET, note_id),
                &json!({
                    "isdocument": false,
                    "filename": null,
                    "mimetype": null,
                    "documentbody": null,
                }),
            )
            .await
    }

    /// Newest notes attached to one record.
    pub async fn list_entity_notes(&self, entity_id: &str, limit: u32) -> Result<Vec<Note>, CrmError> {
        let query = ODataQuery::new()
            .filter(format!("_objectid_value eq {}", entity_id))
            .select(SELECT.iter().copied())
            .top(limit)
            .orderby("createdon", SortOrder::Desc);
        fetch_all::<AnnotationRecord, _>(&self.odata, &format!("/{}", ENTITY_SET), &query).await
    }

    /// Substring match on subject or note text.
    pub async fn search_notes(&self, text: &str, limit: u32) -> Result<Vec<Note>, CrmError> {
        let query = ODataQuery::new()
            .filter(contains_any(&["subject", "notetext"], text))
            .select(SELECT.iter().copied())
            .top(limit)
            .orderby("createdon", SortOrder::Desc);
        fetch_all::<AnnotationRecord, _>(&self.odata, &format!("/{}", ENTITY_SET), &query).await
    }
}
