//! MCP Server implementation with Dynamics 365 CRM tools.

mod params;

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, ErrorData as McpError, Implementation,
        ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::activities::{
    ActivityCreateInput, ActivityListParams, ActivityUpdateInput, AppointmentInput, FaxInput,
    LetterInput, LogCallInput, LogEmailInput,
};
use crate::api::campaigns::{
    CampaignActivityInput, CampaignCreateInput, CampaignResponseInput, CampaignUpdateInput,
};
use crate::api::cases::{CaseCreateInput, CaseResolution, CaseUpdateInput};
use crate::api::common::{PaginationParams, SearchParams};
use crate::api::companies::{CompanyCreateInput, CompanyUpdateInput};
use crate::api::competitors::{CompetitorCreateInput, CompetitorUpdateInput};
use crate::api::contacts::{ContactCreateInput, ContactUpdateInput};
use crate::api::deals::{DealCreateInput, DealUpdateInput};
use crate::api::goals::{GoalCreateInput, GoalUpdateInput};
use crate::api::invoices::{InvoiceCreateInput, InvoiceUpdateInput};
use crate::api::leads::{LeadCreateInput, LeadQualifyInput, LeadUpdateInput};
use crate::api::notes::{AttachmentInput, NoteCreateInput, NoteListParams, NoteUpdateInput};
use crate::api::orders::{SalesOrderCreateInput, SalesOrderUpdateInput};
use crate::api::products::{PriceLevelCreateInput, ProductCreateInput, ProductUpdateInput};
use crate::api::query::{AggregateParams, QueryParams};
use crate::api::quotes::{QuoteCreateInput, QuoteUpdateInput};
use crate::api::relationships::{RecordLink, RelatedRecordsParams};
use crate::api::sales::LineItemInput;
use crate::api::users::{TeamCreateInput, TeamUpdateInput, UserListParams};
use crate::api::CrmClients;
use crate::error::CrmError;
use crate::trace::TraceLog;

use params::*;

/// Dynamics 365 CRM MCP Server.
#[derive(Clone)]
pub struct DynamicsServer {
    clients: CrmClients,
    trace: Arc<TraceLog>,
    tool_router: ToolRouter<Self>,
}

impl DynamicsServer {
    pub fn new(clients: CrmClients, trace: Arc<TraceLog>) -> Self {
        Self {
            clients,
            trace,
            tool_router: Self::tool_router(),
        }
    }

    /// Awaits one adapter call and renders it as the tool response.
    async fn run<T, F>(&self, tool: &str, arguments: Value, call: F) -> Result<CallToolResult, McpError>
    where
        T: Serialize,
        F: Future<Output = Result<T, CrmError>>,
    {
        let started = Instant::now();
        let outcome = call.await;
        if let Err(e) = &outcome {
            tracing::warn!(tool, error = %e, "tool call failed");
        }
        let (success, body) = render(outcome);
        self.trace
            .record(tool, &arguments, success, &body, started.elapsed());

        let text = serde_json::to_string_pretty(&body).map_err(to_mcp_error)?;
        Ok(if success {
            CallToolResult::success(vec![Content::text(text)])
        } else {
            CallToolResult::error(vec![Content::text(text)])
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn to_mcp_error<E: std::fmt::Display>(e: E) -> McpError {
    McpError {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::from(e.to_string()),
        data: None,
    }
}

/// `(success, body)` for a finished call.
fn render<T: Serialize>(outcome: Result<T, CrmError>) -> (bool, Value) {
    let outcome = outcome.and_then(|data| serde_json::to_value(data).map_err(CrmError::from));
    match outcome {
        Ok(data) => (true, json!({ "success": true, "data": data })),
        Err(e) => {
            let mut body = json!({ "success": false, "message": e.to_string() });
            if let Some(seconds) = e.retry_after() {
                body["retryAfterSeconds"] = json!(seconds);
            }
            (false, body)
        }
    }
}

fn arguments<P: Serialize>(params: &P) -> Value {
    serde_json::to_value(params).unwrap_or(Value::Null)
}

fn done(message: String) -> Value {
    json!({ "message": message })
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl DynamicsServer {
    // Connection tools

    #[tool(description = "Test the connection to the Dynamics 365 Web API")]
    async fn dynamics_test_connection(&self) -> Result<CallToolResult, McpError> {
        self.run("dynamics_test_connection", Value::Null, async {
            Ok::<_, CrmError>(self.clients.connection.test_connection().await)
        })
        .await
    }

    #[tool(description = "Get the user, business unit and organization IDs of the calling identity")]
    async fn dynamics_who_am_i(&self) -> Result<CallToolResult, McpError> {
        self.run("dynamics_who_am_i", Value::Null, self.clients.connection.who_am_i())
            .await
    }

    // Contact tools

    #[tool(description = "List contacts with pagination (limit, offset or cursor)")]
    async fn dynamics_list_contacts(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_contacts", arguments(&params), self.clients.contacts.list_contacts(&params))
            .await
    }

    #[tool(description = "Get a contact by ID")]
    async fn dynamics_get_contact(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_contact", arguments(&params), self.clients.contacts.get_contact(&params.id))
            .await
    }

    #[tool(description = "Create a contact. Required: email")]
    async fn dynamics_create_contact(&self, Parameters(params): Parameters<ContactCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_contact", arguments(&params), self.clients.contacts.create_contact(&params))
            .await
    }

    #[tool(description = "Update a contact. Only the given fields are changed")]
    async fn dynamics_update_contact(&self, Parameters(params): Parameters<WithId<ContactUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_contact",
            arguments(&params),
            self.clients.contacts.update_contact(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a contact")]
    async fn dynamics_delete_contact(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_contact", arguments(&params), async {
            self.clients.contacts.delete_contact(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Contact {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Search contacts by name or email text and structured filters")]
    async fn dynamics_search_contacts(&self, Parameters(params): Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_search_contacts", arguments(&params), self.clients.contacts.search_contacts(&params))
            .await
    }

    // Company (account) tools

    #[tool(description = "List companies (accounts) with pagination")]
    async fn dynamics_list_companies(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_companies", arguments(&params), self.clients.companies.list_companies(&params))
            .await
    }

    #[tool(description = "Get a company (account) by ID")]
    async fn dynamics_get_company(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_company", arguments(&params), self.clients.companies.get_company(&params.id))
            .await
    }

    #[tool(description = "Create a company (account). Required: name")]
    async fn dynamics_create_company(&self, Parameters(params): Parameters<CompanyCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_company", arguments(&params), self.clients.companies.create_company(&params))
            .await
    }

    #[tool(description = "Update a company (account). Only the given fields are changed")]
    async fn dynamics_update_company(&self, Parameters(params): Parameters<WithId<CompanyUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_company",
            arguments(&params),
            self.clients.companies.update_company(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a company (account)")]
    async fn dynamics_delete_company(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_company", arguments(&params), async {
            self.clients.companies.delete_company(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Company {} deleted", params.id)))
        })
        .await
    }

    // Deal (opportunity) tools

    #[tool(description = "List deals (opportunities) with pagination")]
    async fn dynamics_list_deals(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_deals", arguments(&params), self.clients.deals.list_deals(&params))
            .await
    }

    #[tool(description = "Get a deal (opportunity) by ID")]
    async fn dynamics_get_deal(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_deal", arguments(&params), self.clients.deals.get_deal(&params.id))
            .await
    }

    #[tool(description = "Create a deal (opportunity). Required: name")]
    async fn dynamics_create_deal(&self, Parameters(params): Parameters<DealCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_deal", arguments(&params), self.clients.deals.create_deal(&params))
            .await
    }

    #[tool(description = "Update a deal (opportunity). Setting status to won, lost or open also moves its state")]
    async fn dynamics_update_deal(&self, Parameters(params): Parameters<WithId<DealUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_deal",
            arguments(&params),
            self.clients.deals.update_deal(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a deal (opportunity)")]
    async fn dynamics_delete_deal(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_deal", arguments(&params), async {
            self.clients.deals.delete_deal(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Deal {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Move a deal (opportunity) to a named pipeline stage")]
    async fn dynamics_move_deal_stage(&self, Parameters(params): Parameters<MoveStageParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_move_deal_stage",
            arguments(&params),
            self.clients.deals.move_deal_stage(&params.id, &params.stage),
        )
        .await
    }

    #[tool(description = "List active sales pipelines (business process flows) and their stages")]
    async fn dynamics_list_pipelines(&self) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_pipelines", Value::Null, self.clients.deals.list_pipelines())
            .await
    }

    // Activity tools

    #[tool(description = "List activities, optionally only those regarding one record")]
    async fn dynamics_list_activities(&self, Parameters(params): Parameters<ActivityListParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_activities", arguments(&params), self.clients.activities.list_activities(&params))
            .await
    }

    #[tool(description = "List activities of one concrete type (task, phonecall, email, appointment, letter, fax)")]
    async fn dynamics_list_activities_by_type(&self, Parameters(params): Parameters<ActivitiesByTypeParams<ActivityListParams>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_activities_by_type",
            arguments(&params),
            self.clients
                .activities
                .list_activities_by_type(&params.activity_type, &params.list),
        )
        .await
    }

    #[tool(description = "Get an activity by ID")]
    async fn dynamics_get_activity(&self, Parameters(params): Parameters<GetActivityParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_activity",
            arguments(&params),
            self.clients
                .activities
                .get_activity(&params.id, params.activity_type.as_deref()),
        )
        .await
    }

    #[tool(description = "Create a task. Required: subject")]
    async fn dynamics_create_task(&self, Parameters(params): Parameters<ActivityCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_task", arguments(&params), self.clients.activities.create_task(&params))
            .await
    }

    #[tool(description = "Update an activity of the given type")]
    async fn dynamics_update_activity(&self, Parameters(params): Parameters<TypedActivityInput<ActivityUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_activity",
            arguments(&params),
            self.clients
                .activities
                .update_activity(&params.id, &params.activity_type, &params.input),
        )
        .await
    }

    #[tool(description = "Delete an activity of the given type")]
    async fn dynamics_delete_activity(&self, Parameters(params): Parameters<TypedActivityParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_activity", arguments(&params), async {
            self.clients
                .activities
                .delete_activity(&params.id, &params.activity_type)
                .await?;
            Ok::<_, CrmError>(done(format!("Activity {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Mark an activity completed")]
    async fn dynamics_complete_activity(&self, Parameters(params): Parameters<TypedActivityParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_complete_activity", arguments(&params), async {
            self.clients
                .activities
                .complete_activity(&params.id, &params.activity_type)
                .await?;
            Ok::<_, CrmError>(done(format!("Activity {} completed", params.id)))
        })
        .await
    }

    #[tool(description = "Cancel an activity")]
    async fn dynamics_cancel_activity(&self, Parameters(params): Parameters<TypedActivityParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_cancel_activity", arguments(&params), async {
            self.clients
                .activities
                .cancel_activity(&params.id, &params.activity_type)
                .await?;
            Ok::<_, CrmError>(done(format!("Activity {} cancelled", params.id)))
        })
        .await
    }

    #[tool(description = "Log a completed phone call with a contact. Required: contactId, subject")]
    async fn dynamics_log_call(&self, Parameters(params): Parameters<LogCallInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_log_call", arguments(&params), self.clients.activities.log_call(&params))
            .await
    }

    #[tool(description = "Log a completed email with a contact. Required: contactId, subject, body")]
    async fn dynamics_log_email(&self, Parameters(params): Parameters<LogEmailInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_log_email", arguments(&params), self.clients.activities.log_email(&params))
            .await
    }

    #[tool(description = "Create an appointment with required and optional attendees")]
    async fn dynamics_create_appointment(&self, Parameters(params): Parameters<AppointmentInput>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_create_appointment",
            arguments(&params),
            self.clients.activities.create_appointment(&params),
        )
        .await
    }

    #[tool(description = "Create a letter activity")]
    async fn dynamics_create_letter(&self, Parameters(params): Parameters<LetterInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_letter", arguments(&params), self.clients.activities.create_letter(&params))
            .await
    }

    #[tool(description = "Create a fax activity")]
    async fn dynamics_create_fax(&self, Parameters(params): Parameters<FaxInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_fax", arguments(&params), self.clients.activities.create_fax(&params))
            .await
    }

    #[tool(description = "List the parties (senders, recipients, attendees) of an activity")]
    async fn dynamics_get_activity_parties(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_activity_parties",
            arguments(&params),
            self.clients.activities.get_activity_parties(&params.id),
        )
        .await
    }

    // Lead tools

    #[tool(description = "List leads with pagination")]
    async fn dynamics_list_leads(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_leads", arguments(&params), self.clients.leads.list_leads(&params))
            .await
    }

    #[tool(description = "Get a lead by ID")]
    async fn dynamics_get_lead(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_lead", arguments(&params), self.clients.leads.get_lead(&params.id))
            .await
    }

    #[tool(description = "Create a lead. Required: lastName")]
    async fn dynamics_create_lead(&self, Parameters(params): Parameters<LeadCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_lead", arguments(&params), self.clients.leads.create_lead(&params))
            .await
    }

    #[tool(description = "Update a lead. Only the given fields are changed")]
    async fn dynamics_update_lead(&self, Parameters(params): Parameters<WithId<LeadUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_lead",
            arguments(&params),
            self.clients.leads.update_lead(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a lead")]
    async fn dynamics_delete_lead(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_lead", arguments(&params), async {
            self.clients.leads.delete_lead(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Lead {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Search leads by name, email or company text and structured filters")]
    async fn dynamics_search_leads(&self, Parameters(params): Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_search_leads", arguments(&params), self.clients.leads.search_leads(&params))
            .await
    }

    #[tool(description = "Qualify a lead, optionally creating an account, contact and opportunity")]
    async fn dynamics_qualify_lead(&self, Parameters(params): Parameters<WithId<LeadQualifyInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_qualify_lead",
            arguments(&params),
            self.clients.leads.qualify_lead(&params.id, &params.input),
        )
        .await
    }

    // Quote tools

    #[tool(description = "List quotes with pagination")]
    async fn dynamics_list_quotes(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_quotes", arguments(&params), self.clients.quotes.list_quotes(&params))
            .await
    }

    #[tool(description = "Get a quote by ID")]
    async fn dynamics_get_quote(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_quote", arguments(&params), self.clients.quotes.get_quote(&params.id))
            .await
    }

    #[tool(description = "Create a quote. Required: name. Link a customer with customerAccountId and a price list with priceLevelId")]
    async fn dynamics_create_quote(&self, Parameters(params): Parameters<QuoteCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_quote", arguments(&params), self.clients.quotes.create_quote(&params))
            .await
    }

    #[tool(description = "Update a draft quote")]
    async fn dynamics_update_quote(&self, Parameters(params): Parameters<WithId<QuoteUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_quote",
            arguments(&params),
            self.clients.quotes.update_quote(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a quote")]
    async fn dynamics_delete_quote(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_quote", arguments(&params), async {
            self.clients.quotes.delete_quote(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Quote {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "List the line items of a quote")]
    async fn dynamics_list_quote_details(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_quote_details",
            arguments(&params),
            self.clients.quotes.list_quote_details(&params.id),
        )
        .await
    }

    #[tool(description = "Add a line item to a quote. id is the quote ID")]
    async fn dynamics_add_quote_detail(&self, Parameters(params): Parameters<WithId<LineItemInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_add_quote_detail",
            arguments(&params),
            self.clients.quotes.add_quote_detail(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Activate a draft quote")]
    async fn dynamics_activate_quote(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_activate_quote", arguments(&params), async {
            self.clients.quotes.activate_quote(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Quote {} activated", params.id)))
        })
        .await
    }

    #[tool(description = "Close an active quote as won, lost or cancelled")]
    async fn dynamics_close_quote(&self, Parameters(params): Parameters<CloseQuoteParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_close_quote", arguments(&params), async {
            self.clients.quotes.close_quote(&params.id, params.status).await?;
            Ok::<_, CrmError>(done(format!("Quote {} closed", params.id)))
        })
        .await
    }

    #[tool(description = "Convert a won quote into a sales order")]
    async fn dynamics_convert_quote_to_order(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_convert_quote_to_order",
            arguments(&params),
            self.clients.quotes.convert_quote_to_order(&params.id),
        )
        .await
    }

    // Sales order tools

    #[tool(description = "List sales orders with pagination")]
    async fn dynamics_list_orders(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_orders", arguments(&params), self.clients.orders.list_orders(&params))
            .await
    }

    #[tool(description = "Get a sales order by ID")]
    async fn dynamics_get_order(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_order", arguments(&params), self.clients.orders.get_order(&params.id))
            .await
    }

    #[tool(description = "Create a sales order. Required: name. Link a customer with customerAccountId and a price list with priceLevelId")]
    async fn dynamics_create_order(&self, Parameters(params): Parameters<SalesOrderCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_order", arguments(&params), self.clients.orders.create_order(&params))
            .await
    }

    #[tool(description = "Update a sales order")]
    async fn dynamics_update_order(&self, Parameters(params): Parameters<WithId<SalesOrderUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_order",
            arguments(&params),
            self.clients.orders.update_order(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a sales order")]
    async fn dynamics_delete_order(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_order", arguments(&params), async {
            self.clients.orders.delete_order(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Order {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "List the line items of a sales order")]
    async fn dynamics_list_order_details(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_order_details",
            arguments(&params),
            self.clients.orders.list_order_details(&params.id),
        )
        .await
    }

    #[tool(description = "Add a line item to a sales order. id is the order ID")]
    async fn dynamics_add_order_detail(&self, Parameters(params): Parameters<WithId<LineItemInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_add_order_detail",
            arguments(&params),
            self.clients.orders.add_order_detail(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Fulfill a sales order")]
    async fn dynamics_fulfill_order(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_fulfill_order", arguments(&params), async {
            self.clients.orders.fulfill_order(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Order {} fulfilled", params.id)))
        })
        .await
    }

    #[tool(description = "Cancel a sales order")]
    async fn dynamics_cancel_order(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_cancel_order", arguments(&params), async {
            self.clients.orders.cancel_order(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Order {} cancelled", params.id)))
        })
        .await
    }

    #[tool(description = "Convert a sales order into an invoice")]
    async fn dynamics_convert_order_to_invoice(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_convert_order_to_invoice",
            arguments(&params),
            self.clients.orders.convert_order_to_invoice(&params.id),
        )
        .await
    }

    // Invoice tools

    #[tool(description = "List invoices with pagination")]
    async fn dynamics_list_invoices(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_invoices", arguments(&params), self.clients.invoices.list_invoices(&params))
            .await
    }

    #[tool(description = "Get an invoice by ID")]
    async fn dynamics_get_invoice(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_invoice", arguments(&params), self.clients.invoices.get_invoice(&params.id))
            .await
    }

    #[tool(description = "Create an invoice. Required: name. Link a customer with customerAccountId and a price list with priceLevelId")]
    async fn dynamics_create_invoice(&self, Parameters(params): Parameters<InvoiceCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_invoice", arguments(&params), self.clients.invoices.create_invoice(&params))
            .await
    }

    #[tool(description = "Update an invoice")]
    async fn dynamics_update_invoice(&self, Parameters(params): Parameters<WithId<InvoiceUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_invoice",
            arguments(&params),
            self.clients.invoices.update_invoice(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete an invoice")]
    async fn dynamics_delete_invoice(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_invoice", arguments(&params), async {
            self.clients.invoices.delete_invoice(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Invoice {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Lock the product prices on an invoice")]
    async fn dynamics_lock_invoice_pricing(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_lock_invoice_pricing", arguments(&params), async {
            self.clients.invoices.lock_invoice_pricing(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Pricing locked for invoice {}", params.id)))
        })
        .await
    }

    #[tool(description = "Cancel an invoice")]
    async fn dynamics_cancel_invoice(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_cancel_invoice", arguments(&params), async {
            self.clients.invoices.cancel_invoice(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Invoice {} cancelled", params.id)))
        })
        .await
    }

    // Product and price list tools

    #[tool(description = "List products with pagination")]
    async fn dynamics_list_products(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_products", arguments(&params), self.clients.products.list_products(&params))
            .await
    }

    #[tool(description = "Get a product by ID")]
    async fn dynamics_get_product(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_product", arguments(&params), self.clients.products.get_product(&params.id))
            .await
    }

    #[tool(description = "Create a product. Required: name, productNumber. Set defaultUomScheduleId and defaultUomId to attach a unit group")]
    async fn dynamics_create_product(&self, Parameters(params): Parameters<ProductCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_product", arguments(&params), self.clients.products.create_product(&params))
            .await
    }

    #[tool(description = "Update a product")]
    async fn dynamics_update_product(&self, Parameters(params): Parameters<WithId<ProductUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_product",
            arguments(&params),
            self.clients.products.update_product(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a product")]
    async fn dynamics_delete_product(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_product", arguments(&params), async {
            self.clients.products.delete_product(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Product {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Publish a draft product (and its hierarchy)")]
    async fn dynamics_publish_product(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_publish_product", arguments(&params), async {
            self.clients.products.publish_product(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Product {} published", params.id)))
        })
        .await
    }

    #[tool(description = "List price lists with pagination")]
    async fn dynamics_list_price_lists(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_price_lists",
            arguments(&params),
            self.clients.products.list_price_levels(&params),
        )
        .await
    }

    #[tool(description = "Get a price list by ID")]
    async fn dynamics_get_price_list(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_price_list",
            arguments(&params),
            self.clients.products.get_price_level(&params.id),
        )
        .await
    }

    #[tool(description = "Create a price list. Required: name")]
    async fn dynamics_create_price_list(&self, Parameters(params): Parameters<PriceLevelCreateInput>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_create_price_list",
            arguments(&params),
            self.clients.products.create_price_level(&params),
        )
        .await
    }

    // Competitor tools

    #[tool(description = "List competitors with pagination")]
    async fn dynamics_list_competitors(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_competitors",
            arguments(&params),
            self.clients.competitors.list_competitors(&params),
        )
        .await
    }

    #[tool(description = "Get a competitor by ID")]
    async fn dynamics_get_competitor(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_competitor",
            arguments(&params),
            self.clients.competitors.get_competitor(&params.id),
        )
        .await
    }

    #[tool(description = "Create a competitor. Required: name")]
    async fn dynamics_create_competitor(&self, Parameters(params): Parameters<CompetitorCreateInput>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_create_competitor",
            arguments(&params),
            self.clients.competitors.create_competitor(&params),
        )
        .await
    }

    #[tool(description = "Update a competitor")]
    async fn dynamics_update_competitor(&self, Parameters(params): Parameters<WithId<CompetitorUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_competitor",
            arguments(&params),
            self.clients
                .competitors
                .update_competitor(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a competitor")]
    async fn dynamics_delete_competitor(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_competitor", arguments(&params), async {
            self.clients.competitors.delete_competitor(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Competitor {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Link a competitor to an opportunity")]
    async fn dynamics_associate_competitor_to_opportunity(&self, Parameters(params): Parameters<CompetitorOpportunityParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_associate_competitor_to_opportunity", arguments(&params), async {
            self.clients
                .competitors
                .associate_to_opportunity(&params.competitor_id, &params.opportunity_id)
                .await?;
            Ok::<_, CrmError>(done("Competitor associated with opportunity".to_string()))
        })
        .await
    }

    #[tool(description = "Unlink a competitor from an opportunity")]
    async fn dynamics_disassociate_competitor_from_opportunity(&self, Parameters(params): Parameters<CompetitorOpportunityParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_disassociate_competitor_from_opportunity", arguments(&params), async {
            self.clients
                .competitors
                .disassociate_from_opportunity(&params.competitor_id, &params.opportunity_id)
                .await?;
            Ok::<_, CrmError>(done("Competitor disassociated from opportunity".to_string()))
        })
        .await
    }

    #[tool(description = "List the competitors linked to an opportunity")]
    async fn dynamics_list_opportunity_competitors(&self, Parameters(params): Parameters<OpportunityParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_opportunity_competitors",
            arguments(&params),
            self.clients
                .competitors
                .list_opportunity_competitors(&params.opportunity_id),
        )
        .await
    }

    // Campaign tools

    #[tool(description = "List marketing campaigns with pagination")]
    async fn dynamics_list_campaigns(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_campaigns", arguments(&params), self.clients.campaigns.list_campaigns(&params))
            .await
    }

    #[tool(description = "Get a campaign by ID")]
    async fn dynamics_get_campaign(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_campaign", arguments(&params), self.clients.campaigns.get_campaign(&params.id))
            .await
    }

    #[tool(description = "Create a campaign. Required: name")]
    async fn dynamics_create_campaign(&self, Parameters(params): Parameters<CampaignCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_campaign", arguments(&params), self.clients.campaigns.create_campaign(&params))
            .await
    }

    #[tool(description = "Update a campaign")]
    async fn dynamics_update_campaign(&self, Parameters(params): Parameters<WithId<CampaignUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_campaign",
            arguments(&params),
            self.clients.campaigns.update_campaign(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a campaign")]
    async fn dynamics_delete_campaign(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_campaign", arguments(&params), async {
            self.clients.campaigns.delete_campaign(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Campaign {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "List the activities of a campaign")]
    async fn dynamics_list_campaign_activities(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_campaign_activities",
            arguments(&params),
            self.clients.campaigns.list_campaign_activities(&params.id),
        )
        .await
    }

    #[tool(description = "Create a campaign activity. id is the campaign ID")]
    async fn dynamics_create_campaign_activity(&self, Parameters(params): Parameters<WithId<CampaignActivityInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_create_campaign_activity",
            arguments(&params),
            self.clients
                .campaigns
                .create_campaign_activity(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "List the responses to a campaign")]
    async fn dynamics_list_campaign_responses(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_campaign_responses",
            arguments(&params),
            self.clients.campaigns.list_campaign_responses(&params.id),
        )
        .await
    }

    #[tool(description = "Record a campaign response. id is the campaign ID")]
    async fn dynamics_create_campaign_response(&self, Parameters(params): Parameters<WithId<CampaignResponseInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_create_campaign_response",
            arguments(&params),
            self.clients
                .campaigns
                .create_campaign_response(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Add a contact, lead or account to a campaign")]
    async fn dynamics_add_campaign_member(&self, Parameters(params): Parameters<CampaignMemberParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_add_campaign_member", arguments(&params), async {
            self.clients
                .campaigns
                .add_campaign_member(&params.campaign_id, params.member_type, &params.member_id)
                .await?;
            Ok::<_, CrmError>(done("Member added to campaign".to_string()))
        })
        .await
    }

    #[tool(description = "Remove a contact, lead or account from a campaign")]
    async fn dynamics_remove_campaign_member(&self, Parameters(params): Parameters<CampaignMemberParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_remove_campaign_member", arguments(&params), async {
            self.clients
                .campaigns
                .remove_campaign_member(&params.campaign_id, params.member_type, &params.member_id)
                .await?;
            Ok::<_, CrmError>(done("Member removed from campaign".to_string()))
        })
        .await
    }

    // Case (incident) tools

    #[tool(description = "List service cases with pagination")]
    async fn dynamics_list_cases(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_cases", arguments(&params), self.clients.cases.list_cases(&params))
            .await
    }

    #[tool(description = "Get a case by ID")]
    async fn dynamics_get_case(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_case", arguments(&params), self.clients.cases.get_case(&params.id))
            .await
    }

    #[tool(description = "Create a case. Required: title. Set customerAccountId or customerContactId for the customer")]
    async fn dynamics_create_case(&self, Parameters(params): Parameters<CaseCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_case", arguments(&params), self.clients.cases.create_case(&params))
            .await
    }

    #[tool(description = "Update a case")]
    async fn dynamics_update_case(&self, Parameters(params): Parameters<WithId<CaseUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_case",
            arguments(&params),
            self.clients.cases.update_case(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a case")]
    async fn dynamics_delete_case(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_case", arguments(&params), async {
            self.clients.cases.delete_case(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Case {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Resolve a case with a resolution activity")]
    async fn dynamics_resolve_case(&self, Parameters(params): Parameters<WithId<CaseResolution>>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_resolve_case", arguments(&params), async {
            self.clients.cases.resolve_case(&params.id, &params.input).await?;
            Ok::<_, CrmError>(done(format!("Case {} resolved", params.id)))
        })
        .await
    }

    #[tool(description = "Cancel a case")]
    async fn dynamics_cancel_case(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_cancel_case", arguments(&params), async {
            self.clients.cases.cancel_case(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Case {} cancelled", params.id)))
        })
        .await
    }

    #[tool(description = "Reactivate a resolved or cancelled case")]
    async fn dynamics_reactivate_case(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_reactivate_case", arguments(&params), async {
            self.clients.cases.reactivate_case(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Case {} reactivated", params.id)))
        })
        .await
    }

    // Goal tools

    #[tool(description = "List goals with pagination")]
    async fn dynamics_list_goals(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_goals", arguments(&params), self.clients.goals.list_goals(&params))
            .await
    }

    #[tool(description = "Get a goal by ID")]
    async fn dynamics_get_goal(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_goal", arguments(&params), self.clients.goals.get_goal(&params.id))
            .await
    }

    #[tool(description = "Create a goal. Required: title, goalOwnerId, metricId")]
    async fn dynamics_create_goal(&self, Parameters(params): Parameters<GoalCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_goal", arguments(&params), self.clients.goals.create_goal(&params))
            .await
    }

    #[tool(description = "Update a goal")]
    async fn dynamics_update_goal(&self, Parameters(params): Parameters<WithId<GoalUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_goal",
            arguments(&params),
            self.clients.goals.update_goal(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a goal")]
    async fn dynamics_delete_goal(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_goal", arguments(&params), async {
            self.clients.goals.delete_goal(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Goal {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Recalculate the actual and in-progress values of a goal")]
    async fn dynamics_recalculate_goal(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_recalculate_goal", arguments(&params), async {
            self.clients.goals.recalculate_goal(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Goal {} recalculated", params.id)))
        })
        .await
    }

    #[tool(description = "List goal metrics with pagination")]
    async fn dynamics_list_goal_metrics(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_goal_metrics", arguments(&params), self.clients.goals.list_goal_metrics(&params))
            .await
    }

    #[tool(description = "Get a goal metric by ID")]
    async fn dynamics_get_goal_metric(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_goal_metric", arguments(&params), self.clients.goals.get_goal_metric(&params.id))
            .await
    }

    // Note (annotation) tools

    #[tool(description = "List notes, optionally only those attached to one record")]
    async fn dynamics_list_notes(&self, Parameters(params): Parameters<NoteListParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_notes", arguments(&params), self.clients.notes.list_notes(&params))
            .await
    }

    #[tool(description = "Get a note by ID (without the attachment body)")]
    async fn dynamics_get_note(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_note", arguments(&params), self.clients.notes.get_note(&params.id))
            .await
    }

    #[tool(description = "Create a note, optionally attached to a record and carrying a base64 attachment")]
    async fn dynamics_create_note(&self, Parameters(params): Parameters<NoteCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_note", arguments(&params), self.clients.notes.create_note(&params))
            .await
    }

    #[tool(description = "Update a note")]
    async fn dynamics_update_note(&self, Parameters(params): Parameters<WithId<NoteUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_note",
            arguments(&params),
            self.clients.notes.update_note(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a note")]
    async fn dynamics_delete_note(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_note", arguments(&params), async {
            self.clients.notes.delete_note(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Note {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Get the attachment of a note (base64 encoded)")]
    async fn dynamics_get_note_attachment(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_note_attachment",
            arguments(&params),
            self.clients.notes.get_note_attachment(&params.id),
        )
        .await
    }

    #[tool(description = "Add or replace the attachment of a note. id is the note ID")]
    async fn dynamics_add_attachment_to_note(&self, Parameters(params): Parameters<WithId<AttachmentInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_add_attachment_to_note",
            arguments(&params),
            self.clients
                .notes
                .add_attachment_to_note(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Remove the attachment from a note")]
    async fn dynamics_remove_attachment_from_note(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_remove_attachment_from_note", arguments(&params), async {
            self.clients.notes.remove_attachment_from_note(&params.id).await?;
            Ok::<_, CrmError>(done("Attachment removed from note".to_string()))
        })
        .await
    }

    #[tool(description = "List the notes attached to a record, newest first")]
    async fn dynamics_list_entity_notes(&self, Parameters(params): Parameters<EntityNotesParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_entity_notes",
            arguments(&params),
            self.clients
                .notes
                .list_entity_notes(&params.entity_id, page_limit(params.limit)),
        )
        .await
    }

    #[tool(description = "Search notes by subject or text")]
    async fn dynamics_search_notes(&self, Parameters(params): Parameters<TextSearchParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_search_notes",
            arguments(&params),
            self.clients
                .notes
                .search_notes(&params.query, page_limit(params.limit)),
        )
        .await
    }

    // User, team and business unit tools

    #[tool(description = "List system users (enabled only by default)")]
    async fn dynamics_list_users(&self, Parameters(params): Parameters<UserListParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_users", arguments(&params), self.clients.users.list_users(&params))
            .await
    }

    #[tool(description = "Get a system user by ID")]
    async fn dynamics_get_user(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_user", arguments(&params), self.clients.users.get_user(&params.id))
            .await
    }

    #[tool(description = "Get the system user the server is authenticated as")]
    async fn dynamics_get_current_user(&self) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_current_user", Value::Null, self.clients.users.get_current_user())
            .await
    }

    #[tool(description = "Search system users by name or email")]
    async fn dynamics_search_users(&self, Parameters(params): Parameters<TextSearchParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_search_users",
            arguments(&params),
            self.clients
                .users
                .search_users(&params.query, page_limit(params.limit)),
        )
        .await
    }

    #[tool(description = "List teams with pagination")]
    async fn dynamics_list_teams(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_teams", arguments(&params), self.clients.users.list_teams(&params))
            .await
    }

    #[tool(description = "Get a team by ID")]
    async fn dynamics_get_team(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_get_team", arguments(&params), self.clients.users.get_team(&params.id))
            .await
    }

    #[tool(description = "Create a team. Required: name, businessUnitId")]
    async fn dynamics_create_team(&self, Parameters(params): Parameters<TeamCreateInput>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_create_team", arguments(&params), self.clients.users.create_team(&params))
            .await
    }

    #[tool(description = "Update a team")]
    async fn dynamics_update_team(&self, Parameters(params): Parameters<WithId<TeamUpdateInput>>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_update_team",
            arguments(&params),
            self.clients.users.update_team(&params.id, &params.input),
        )
        .await
    }

    #[tool(description = "Delete a team")]
    async fn dynamics_delete_team(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_delete_team", arguments(&params), async {
            self.clients.users.delete_team(&params.id).await?;
            Ok::<_, CrmError>(done(format!("Team {} deleted", params.id)))
        })
        .await
    }

    #[tool(description = "Add a user to a team")]
    async fn dynamics_add_team_member(&self, Parameters(params): Parameters<TeamMemberParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_add_team_member", arguments(&params), async {
            self.clients
                .users
                .add_team_member(&params.team_id, &params.user_id)
                .await?;
            Ok::<_, CrmError>(done("User added to team".to_string()))
        })
        .await
    }

    #[tool(description = "Remove a user from a team")]
    async fn dynamics_remove_team_member(&self, Parameters(params): Parameters<TeamMemberParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_remove_team_member", arguments(&params), async {
            self.clients
                .users
                .remove_team_member(&params.team_id, &params.user_id)
                .await?;
            Ok::<_, CrmError>(done("User removed from team".to_string()))
        })
        .await
    }

    #[tool(description = "List the members of a team")]
    async fn dynamics_list_team_members(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_list_team_members", arguments(&params), self.clients.users.list_team_members(&params.id))
            .await
    }

    #[tool(description = "List enabled business units")]
    async fn dynamics_list_business_units(&self, Parameters(params): Parameters<PaginationParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_business_units",
            arguments(&params),
            self.clients.users.list_business_units(&params),
        )
        .await
    }

    #[tool(description = "Get a business unit by ID")]
    async fn dynamics_get_business_unit(&self, Parameters(params): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_business_unit",
            arguments(&params),
            self.clients.users.get_business_unit(&params.id),
        )
        .await
    }

    // Query tools

    #[tool(description = "Run an OData query against any entity ($select, $filter, $orderby, $expand, $top, $skip, $count)")]
    async fn dynamics_query(&self, Parameters(params): Parameters<QueryParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_query", arguments(&params), self.clients.query.execute_query(&params))
            .await
    }

    #[tool(description = "Run a FetchXML query against an entity")]
    async fn dynamics_fetchxml_query(&self, Parameters(params): Parameters<FetchXmlParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_fetchxml_query",
            arguments(&params),
            self.clients
                .query
                .execute_fetch_xml(&params.entity_type, &params.fetch_xml),
        )
        .await
    }

    #[tool(description = "Run an aggregate (count, sum, avg, min, max) with optional grouping")]
    async fn dynamics_aggregate(&self, Parameters(params): Parameters<AggregateParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_aggregate", arguments(&params), self.clients.query.execute_aggregate(&params))
            .await
    }

    #[tool(description = "Count the records of an entity, optionally filtered")]
    async fn dynamics_count(&self, Parameters(params): Parameters<CountParams>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_count", arguments(&params), async {
            let count = self
                .clients
                .query
                .get_record_count(&params.entity_type, params.filter.as_deref())
                .await?;
            Ok::<_, CrmError>(json!({ "entityType": params.entity_type, "count": count }))
        })
        .await
    }

    #[tool(description = "Execute a saved (system) view")]
    async fn dynamics_saved_query(&self, Parameters(params): Parameters<StoredQueryParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_saved_query",
            arguments(&params),
            self.clients
                .query
                .execute_saved_query(&params.query_id, &params.entity_type, params.top()),
        )
        .await
    }

    #[tool(description = "Execute a personal (user) view")]
    async fn dynamics_user_query(&self, Parameters(params): Parameters<StoredQueryParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_user_query",
            arguments(&params),
            self.clients
                .query
                .execute_user_query(&params.query_id, &params.entity_type, params.top()),
        )
        .await
    }

    // Batch tools

    #[tool(description = "Create many records of one entity. Each record is a map of wire attributes")]
    async fn dynamics_batch_create(&self, Parameters(params): Parameters<BatchCreateParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_batch_create",
            arguments(&params),
            self.clients.batch.batch_create(
                &params.entity_type,
                &params.records,
                params.continue_on_error,
            ),
        )
        .await
    }

    #[tool(description = "Update many records of one entity")]
    async fn dynamics_batch_update(&self, Parameters(params): Parameters<BatchUpdateParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_batch_update",
            arguments(&params),
            self.clients.batch.batch_update(
                &params.entity_type,
                &params.updates,
                params.continue_on_error,
            ),
        )
        .await
    }

    #[tool(description = "Delete many records of one entity")]
    async fn dynamics_batch_delete(&self, Parameters(params): Parameters<BatchDeleteParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_batch_delete",
            arguments(&params),
            self.clients.batch.batch_delete(
                &params.entity_type,
                &params.ids,
                params.continue_on_error,
            ),
        )
        .await
    }

    #[tool(description = "Upsert records in order: keyed records (id or alternate key) are updated, the rest created")]
    async fn dynamics_batch_upsert(&self, Parameters(params): Parameters<BatchUpsertParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_batch_upsert",
            arguments(&params),
            self.clients.batch.batch_upsert(
                &params.entity_type,
                &params.records,
                params.continue_on_error,
            ),
        )
        .await
    }

    // Metadata tools

    #[tool(description = "List entity definitions, optionally filtered by logical name")]
    async fn dynamics_list_entities(&self, Parameters(params): Parameters<ListEntitiesParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_entities",
            arguments(&params),
            self.clients
                .metadata
                .list_entities(params.filter.as_deref(), params.include_custom),
        )
        .await
    }

    #[tool(description = "Get the full definition of one entity")]
    async fn dynamics_get_entity_metadata(&self, Parameters(params): Parameters<EntityNameParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_entity_metadata",
            arguments(&params),
            self.clients.metadata.get_entity_metadata(&params.entity_name),
        )
        .await
    }

    #[tool(description = "List the attributes of an entity, optionally of one type")]
    async fn dynamics_list_entity_attributes(&self, Parameters(params): Parameters<EntityAttributesParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_entity_attributes",
            arguments(&params),
            self.clients
                .metadata
                .list_entity_attributes(&params.entity_name, params.attribute_type.as_deref()),
        )
        .await
    }

    #[tool(description = "Get the full definition of one attribute")]
    async fn dynamics_get_attribute_metadata(&self, Parameters(params): Parameters<AttributeParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_attribute_metadata",
            arguments(&params),
            self.clients
                .metadata
                .get_attribute_metadata(&params.entity_name, &params.attribute_name),
        )
        .await
    }

    #[tool(description = "List the values and labels of a picklist attribute")]
    async fn dynamics_get_optionset_values(&self, Parameters(params): Parameters<AttributeParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_optionset_values",
            arguments(&params),
            self.clients
                .metadata
                .get_optionset_values(&params.entity_name, &params.attribute_name),
        )
        .await
    }

    #[tool(description = "List the values and labels of a global option set")]
    async fn dynamics_get_global_optionset(&self, Parameters(params): Parameters<OptionSetNameParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_get_global_optionset",
            arguments(&params),
            self.clients.metadata.get_global_optionset(&params.name),
        )
        .await
    }

    // Relationship tools

    #[tool(description = "Link two existing records through a collection-valued navigation property")]
    async fn dynamics_associate_records(&self, Parameters(params): Parameters<RecordLink>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_associate_records", arguments(&params), async {
            self.clients.relationships.associate_records(&params).await?;
            Ok::<_, CrmError>(done("Records associated".to_string()))
        })
        .await
    }

    #[tool(description = "Remove the link between two records")]
    async fn dynamics_disassociate_records(&self, Parameters(params): Parameters<RecordLink>) -> Result<CallToolResult, McpError> {
        self.run("dynamics_disassociate_records", arguments(&params), async {
            self.clients.relationships.disassociate_records(&params).await?;
            Ok::<_, CrmError>(done("Records disassociated".to_string()))
        })
        .await
    }

    #[tool(description = "List the records reachable from a record through a navigation property")]
    async fn dynamics_list_related_records(&self, Parameters(params): Parameters<RelatedRecordsParams>) -> Result<CallToolResult, McpError> {
        self.run(
            "dynamics_list_related_records",
            arguments(&params),
            self.clients.relationships.list_related_records(&params),
        )
        .await
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl ServerHandler for DynamicsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Dynamics 365 CRM MCP Server - Read and write contacts, accounts, opportunities, \
                activities, leads, quotes, orders, invoices, products, campaigns, cases, goals, \
                notes, users and teams through the Dataverse Web API, plus generic OData and \
                FetchXML queries, batch operations, metadata and relationships."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_response, odata_client, ScriptedTransport};
    use reqwest::StatusCode;

    fn server(transport: Arc<ScriptedTransport>) -> DynamicsServer {
        DynamicsServer::new(
            CrmClients::new(odata_client(transport)),
            Arc::new(TraceLog::disabled()),
        )
    }

    fn text(result: &CallToolResult) -> Value {
        let raw = result.content[0].as_text().unwrap().text.clone();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_render_wraps_data() {
        let (success, body) = render(Ok::<_, CrmError>(vec![1, 2]));
        assert!(success);
        assert_eq!(body, json!({"success": true, "data": [1, 2]}));
    }

    #[test]
    fn test_render_reports_rate_limit_delay() {
        let (success, body) = render::<()>(Err(CrmError::RateLimit {
            message: "Too many requests".to_string(),
            retry_after_seconds: 30,
        }));
        assert!(!success);
        assert_eq!(body["success"], false);
        assert_eq!(body["retryAfterSeconds"], 30);
        assert!(body["message"].as_str().unwrap().contains("Too many requests"));
    }

    #[test]
    fn test_render_api_error_message() {
        let (_, body) = render::<()>(Err(CrmError::CrmApi {
            status: StatusCode::NOT_FOUND,
            message: "contact With Id = C9 Does Not Exist".to_string(),
        }));
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("contact With Id = C9 Does Not Exist"));
    }

    #[tokio::test]
    async fn test_failed_call_sets_error_flag() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(404, json!({"error": {"message": "not found"}})));
        let server = server(transport);

        let result = server
            .dynamics_get_contact(Parameters(IdParams {
                id: "C9".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(text(&result)["success"], false);
    }

    #[tokio::test]
    async fn test_delete_reports_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(crate::testing::no_content());
        let server = server(transport.clone());

        let result = server
            .dynamics_delete_lead(Parameters(IdParams {
                id: "L1".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        assert_eq!(text(&result)["data"]["message"], "Lead L1 deleted");
        assert!(transport.last_request().url.ends_with("/leads(L1)"));
    }

    #[test]
    fn test_required_fields_in_descriptions_match_schemas() {
        let server = server(Arc::new(ScriptedTransport::new()));
        let mut checked = 0;
        for tool in server.tool_router.list_all() {
            let description = tool.description.as_deref().unwrap_or_default();
            let Some(listed) = description.split("Required: ").nth(1) else {
                continue;
            };
            let listed = listed.split('.').next().unwrap_or_default();
            let required: Vec<&str> = tool
                .input_schema
                .get("required")
                .and_then(Value::as_array)
                .map(|names| names.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            for name in listed.split(", ") {
                assert!(
                    required.contains(&name),
                    "{} lists {} but requires {:?}",
                    tool.name,
                    name,
                    required
                );
            }
            checked += 1;
        }
        assert!(checked >= 15);
    }

    #[test]
    fn test_every_tool_is_prefixed() {
        let server = server(Arc::new(ScriptedTransport::new()));
        let tools = server.tool_router.list_all();
        assert!(tools.len() >= 150);
        assert!(tools.iter().all(|tool| tool.name.starts_with("dynamics_")));
    }
}
