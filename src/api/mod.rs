//! Dynamics 365 entity clients, one module per entity family.

pub mod activities;
pub mod batch;
pub mod campaigns;
pub mod cases;
pub mod common;
pub mod companies;
pub mod competitors;
pub mod connection;
pub mod contacts;
pub mod deals;
pub mod goals;
pub mod invoices;
pub mod leads;
pub mod metadata;
pub mod notes;
pub mod orders;
pub mod products;
pub mod query;
pub mod quotes;
pub mod relationships;
pub mod sales;
pub mod users;
pub mod wire;

// Re-export commonly used types
pub use activities::ActivitiesClient;
pub use batch::BatchClient;
pub use campaigns::CampaignsClient;
pub use cases::CasesClient;
pub use companies::CompaniesClient;
pub use competitors::CompetitorsClient;
pub use connection::ConnectionClient;
pub use contacts::ContactsClient;
pub use deals::DealsClient;
pub use goals::GoalsClient;
pub use invoices::InvoicesClient;
pub use leads::LeadsClient;
pub use metadata::MetadataClient;
pub use notes::NotesClient;
pub use orders::OrdersClient;
pub use products::ProductsClient;
pub use query::QueryClient;
pub use quotes::QuotesClient;
pub use relationships::RelationshipsClient;
pub use users::UsersClient;

use crate::odata::ODataClient;

/// Every entity client, sharing one request engine and token cache.
#[derive(Clone, Debug)]
pub struct CrmClients {
    pub connection: ConnectionClient,
    pub contacts: ContactsClient,
    pub companies: CompaniesClient,
    pub deals: DealsClient,
    pub activities: ActivitiesClient,
    pub leads: LeadsClient,
    pub quotes: QuotesClient,
    pub orders: OrdersClient,
    pub invoices: InvoicesClient,
    pub products: ProductsClient,
    pub competitors: CompetitorsClient,
    pub campaigns: CampaignsClient,
    pub cases: CasesClient,
    pub goals: GoalsClient,
    pub notes: NotesClient,
    pub users: UsersClient,
    pub query: QueryClient,
    pub batch: BatchClient,
    pub metadata: MetadataClient,
    pub relationships: RelationshipsClient,
}

impl CrmClients {
    pub fn new(odata: ODataClient) -> Self {
        Self {
            connection: ConnectionClient::new(odata.clone()),
            contacts: ContactsClient::new(odata.clone()),
            companies: CompaniesClient::new(odata.clone()),
            deals: DealsClient::new(odata.clone()),
            activities: ActivitiesClient::new(odata.clone()),
            leads: LeadsClient::new(odata.clone()),
            quotes: QuotesClient::new(odata.clone()),
            orders: OrdersClient::new(odata.clone()),
            invoices: InvoicesClient::new(odata.clone()),
            products: ProductsClient::new(odata.clone()),
            competitors: CompetitorsClient::new(odata.clone()),
            campaigns: CampaignsClient::new(odata.clone()),
            cases: CasesClient::new(odata.clone()),
            goals: GoalsClient::new(odata.clone()),
            notes: NotesClient::new(odata.clone()),
            users: UsersClient::new(odata.clone()),
            query: QueryClient::new(odata.clone()),
            batch: BatchClient::new(odata.clone()),
            metadata: MetadataClient::new(odata.clone()),
            relationships: RelationshipsClient::new(odata),
        }
    }
}
