use std::sync::Arc;

use tm_core::{AuthProvider, BookmarkRepo, MembershipRepo, ReviewRepo, UserRepo, VenueRepo};
use tm_services::{
    AccountService, BookmarkService, MembershipService, ReviewService, SearchService, SearchSettings,
    VenueService,
};

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub venues: Arc<VenueService>,
    pub reviews: Arc<ReviewService>,
    pub bookmarks: Arc<BookmarkService>,
    pub membership: Arc<MembershipService>,
    pub accounts: Arc<AccountService>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// Wires every service onto one store that implements all the ports.
    pub fn new<S>(store: Arc<S>, auth: Arc<dyn AuthProvider>, search: SearchSettings) -> Self
    where
        S: VenueRepo + ReviewRepo + BookmarkRepo + MembershipRepo + UserRepo + 'static,
    {
        let venues: Arc<dyn VenueRepo> = store.clone();
        let reviews: Arc<dyn ReviewRepo> = store.clone();
        let bookmarks: Arc<dyn BookmarkRepo> = store.clone();
        let serials: Arc<dyn MembershipRepo> = store.clone();
        let users: Arc<dyn UserRepo> = store;

        Self {
            search: Arc::new(SearchService::new(venues.clone(), search)),
            venues: Arc::new(VenueService::new(venues.clone(), bookmarks.clone())),
            reviews: Arc::new(ReviewService::new(venues.clone(), reviews)),
            bookmarks: Arc::new(BookmarkService::new(venues, bookmarks)),
            membership: Arc::new(MembershipService::new(serials, users.clone())),
            accounts: Arc::new(AccountService::new(users, auth.clone())),
            auth,
        }
    }
}
