mod cli;
mod pipeline;
mod train;
