pub mod user;
pub mod dome;
pub mod theme;
pub mod show;
pub mod session;
pub mod reservation;

pub use user::User;
pub use dome::{Dome, DomeGeometry, NewDome};
pub use theme::ShowTheme;
pub use show::{AstronomyShow, NewAstronomyShow};
pub use session::{NewShowSession, SeatPosition, SessionDetail, SessionListing, ShowSession};
pub use reservation::{NewTicket, Reservation, ReservationListing, Ticket, TicketListing, TicketRequest};
