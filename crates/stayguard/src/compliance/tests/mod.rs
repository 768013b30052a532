mod common;
mod switch;
