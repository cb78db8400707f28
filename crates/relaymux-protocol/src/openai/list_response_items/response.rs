pub use super::types::ResponseItemList as ListResponseItemsResponse;
