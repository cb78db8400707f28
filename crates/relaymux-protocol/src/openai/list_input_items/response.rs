pub use crate::openai::list_response_items::ResponseItemList as ListInputItemsResponse;
