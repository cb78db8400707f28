/// `GET /v1/models` takes no parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListModelsRequest;
