pub mod toss_payments;
