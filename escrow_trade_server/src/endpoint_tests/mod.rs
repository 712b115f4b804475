mod conversations;
mod helpers;
mod mocks;
mod trades;
