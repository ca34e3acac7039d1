// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

//! Durable outbound email dispatcher. The embedding application talks to the
//! [`modules::dispatch::MAILER`] singleton (`send` / `bounced`) and subscribes
//! to delivery-outcome events on [`modules::hook::EVENT_CHANNEL`].

pub mod modules;
