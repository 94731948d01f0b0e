/// The authenticated principal attached to a request after token verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: u32,
    /// Recorded as the actor in `created_by` / `updated_by`
    pub fullname: String,
    pub email: String,
}
